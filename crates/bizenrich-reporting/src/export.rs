use std::path::Path;

use bizenrich_core::ResultRecord;
use bizenrich_core::model::WEEKDAYS;

use crate::types::{ExportError, ExportFormat};

const HEADERS: [&str; 20] = [
    "Input Name",
    "Input Address",
    "Input City",
    "Input Postal Code",
    "Name",
    "Address",
    "Phone",
    "Website",
    "Category",
    "Rating",
    "Reviews",
    "Monday Hours",
    "Tuesday Hours",
    "Wednesday Hours",
    "Thursday Hours",
    "Friday Hours",
    "Saturday Hours",
    "Sunday Hours",
    "Status",
    "Error",
];

/// Render records as CSV, one row per record in the given order.
pub fn to_csv(records: &[ResultRecord]) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADERS.iter().map(|h| h.to_string()));

    for record in records {
        let input = &record.original_data;
        let scraped = record.scraped_data.as_ref();
        let text = |f: Option<&String>| f.cloned().unwrap_or_default();

        let mut row = vec![
            input.name.clone(),
            text(input.address.as_ref()),
            text(input.city.as_ref()),
            text(input.postal_code.as_ref()),
            text(scraped.and_then(|s| s.full_name.as_ref())),
            text(scraped.and_then(|s| s.full_address.as_ref())),
            text(scraped.and_then(|s| s.phone.as_ref())),
            text(scraped.and_then(|s| s.website.as_ref())),
            text(scraped.and_then(|s| s.category.as_ref())),
            scraped
                .and_then(|s| s.rating)
                .map(|r| r.to_string())
                .unwrap_or_default(),
            scraped
                .and_then(|s| s.reviews_count)
                .map(|n| n.to_string())
                .unwrap_or_default(),
        ];
        for day in WEEKDAYS {
            let hours = scraped.and_then(|s| s.hours_for(day)).unwrap_or("");
            row.push(format_hours(hours));
        }
        row.push(record.status().label().to_string());
        row.push(record.error_message().unwrap_or("").to_string());

        push_row(&mut out, row.into_iter());
    }
    out
}

fn push_row(out: &mut String, fields: impl Iterator<Item = String>) {
    let escaped: Vec<String> = fields.map(|f| escape_field(&f)).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Pretty-printed JSON array of the records as received.
pub fn to_json(records: &[ResultRecord]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Write `records` to `path` in `format`.
pub fn write_export(
    path: &Path,
    format: ExportFormat,
    records: &[ResultRecord],
) -> Result<(), ExportError> {
    let content = match format {
        ExportFormat::Csv => to_csv(records),
        ExportFormat::Json => to_json(records)?,
    };
    std::fs::write(path, content)?;
    log::info!(
        "exported {} records as {} to {}",
        records.len(),
        format.label(),
        path.display()
    );
    Ok(())
}

/// Normalize an opening-hours string to `HH:MM - HH:MM`.
///
/// Comma-separated ranges are joined with ` & `, 12-hour times become 24-hour
/// times, and anything that is not a range ("Closed", "Open 24 hours") is
/// returned as is.
pub fn format_hours(hours: &str) -> String {
    let hours = hours.trim();
    if hours.is_empty() {
        return String::new();
    }
    // en dash, as used by most map providers
    let hours = hours.replace('\u{2013}', "-");
    if is_canonical_range(&hours) {
        return hours;
    }
    if hours.contains(',') {
        return hours
            .split(',')
            .map(str::trim)
            .map(|range| {
                if range.contains('-') {
                    format_range(range)
                } else {
                    range.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" & ");
    }
    if hours.contains('-') {
        return format_range(&hours);
    }
    hours
}

fn is_canonical_range(s: &str) -> bool {
    match s.split_once('-') {
        Some((start, end)) => is_hh_mm(start.trim_end()) && is_hh_mm(end.trim_start()),
        None => false,
    }
}

fn is_hh_mm(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 5
        && b[2] == b':'
        && [0, 1, 3, 4].iter().all(|&i| b[i].is_ascii_digit())
}

fn format_range(range: &str) -> String {
    match range.split_once('-') {
        Some((start, end)) => format!("{} - {}", format_time(start.trim()), format_time(end.trim())),
        None => range.to_string(),
    }
}

fn format_time(time: &str) -> String {
    if time.is_empty() || is_hh_mm(time) {
        return time.to_string();
    }
    let b = time.as_bytes();
    if b.len() == 4 && b[0].is_ascii_digit() && b[1] == b':' && b[2..].iter().all(u8::is_ascii_digit) {
        return format!("0{time}");
    }

    let lower = time.to_ascii_lowercase();
    let Some((pos, is_pm)) = lower
        .find("am")
        .map(|p| (p, false))
        .or_else(|| lower.find("pm").map(|p| (p, true)))
    else {
        return time.to_string();
    };
    let clock = lower[..pos].trim();
    let (h, m) = match clock.split_once(':') {
        Some((h, m)) => (h.parse::<u32>(), m.parse::<u32>()),
        None => (clock.parse::<u32>(), Ok(0)),
    };
    match (h, m) {
        (Ok(h), Ok(m)) if (1..=12).contains(&h) && m < 60 => {
            let h24 = match (h, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            };
            format!("{h24:02}:{m:02}")
        }
        _ => time.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizenrich_core::{OriginalData, ScrapeStatus, ScrapedData};
    use std::collections::BTreeMap;

    fn scraped(hours: &[(&str, &str)]) -> ScrapedData {
        ScrapedData {
            full_name: Some("Café Roma, Downtown".into()),
            full_address: Some("1 Main St".into()),
            phone: Some("+1 555 0100".into()),
            social_media: None,
            opening_hours: Some(
                hours
                    .iter()
                    .map(|(d, h)| (d.to_string(), h.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            rating: Some(4.5),
            reviews_count: Some(120),
            category: Some("Coffee shop".into()),
            website: None,
            coordinates: None,
            status: ScrapeStatus::Success,
            scraped_at: None,
            error: None,
        }
    }

    fn record(scraped_data: Option<ScrapedData>, error: Option<&str>) -> ResultRecord {
        ResultRecord {
            job_id: Some("j1".into()),
            original_data: OriginalData {
                name: "Cafe Roma".into(),
                address: Some("1 Main St".into()),
                city: Some("Springfield".into()),
                postal_code: Some("12345".into()),
            },
            scraped_data,
            processing_time: None,
            processed_at: None,
            worker: None,
            error: error.map(String::from),
        }
    }

    #[test]
    fn hours_normalization() {
        assert_eq!(format_hours("09:00 - 17:00"), "09:00 - 17:00");
        assert_eq!(format_hours("9:00-17:30"), "09:00 - 17:30");
        assert_eq!(format_hours("9am - 5:30 PM"), "09:00 - 17:30");
        assert_eq!(format_hours("12am-12pm"), "00:00 - 12:00");
        assert_eq!(
            format_hours("09:00-12:00, 14:00-18:00"),
            "09:00 - 12:00 & 14:00 - 18:00"
        );
        assert_eq!(format_hours("8\u{2013}17:00"), "8 - 17:00");
        assert_eq!(format_hours("Closed"), "Closed");
        assert_eq!(format_hours("Open 24 hours"), "Open 24 hours");
        assert_eq!(format_hours("  "), "");
    }

    #[test]
    fn csv_row_layout_and_escaping() {
        let csv = to_csv(&[record(
            Some(scraped(&[("Monday", "9am-5pm"), ("sun", "Closed")])),
            None,
        )]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(HEADERS.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some(
                "Cafe Roma,1 Main St,Springfield,12345,\"Café Roma, Downtown\",1 Main St,\
                 +1 555 0100,,Coffee shop,4.5,120,09:00 - 17:00,,,,,,Closed,Success,"
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn failed_record_keeps_input_columns() {
        let csv = to_csv(&[record(None, Some("No search results, \"Cafe\""))]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("Cafe Roma,1 Main St,Springfield,12345,,"));
        assert!(row.ends_with(",Failed,\"No search results, \"\"Cafe\"\"\""));
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(to_csv(&[]).lines().count(), 1);
    }

    #[test]
    fn writes_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_export(&path, ExportFormat::Json, &[record(None, Some("Timeout"))]).unwrap();
        let back: Vec<ResultRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].error.as_deref(), Some("Timeout"));
    }
}
