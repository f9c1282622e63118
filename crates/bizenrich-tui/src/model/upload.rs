use std::path::{Path, PathBuf};

/// Path entry on the upload screen.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub input: String,
    pub error: Option<String>,
}

impl UploadForm {
    pub fn push(&mut self, c: char) {
        self.input.push(c);
        self.error = None;
    }

    pub fn pop(&mut self) {
        self.input.pop();
        self.error = None;
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.error = None;
    }

    /// Resolve the typed path to an existing `.csv` file.
    pub fn validate(&self) -> Result<PathBuf, String> {
        let raw = self.input.trim().trim_matches(|c| c == '\'' || c == '"');
        if raw.is_empty() {
            return Err("Enter the path of a CSV file".to_string());
        }
        let path = expand_home(raw);
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err("Only CSV files are accepted".to_string());
        }
        if !path.is_file() {
            return Err(format!("File not found: {}", path.display()));
        }
        Ok(path)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(raw).to_path_buf(),
    }
}
