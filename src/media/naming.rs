//! Output filename generation

use chrono::Local;
use uuid::Uuid;

/// Produces unique filenames for persisted videos
pub trait FilenameGenerator: Send + Sync + 'static {
    /// A filename (no directory) that has not been handed out before
    fn generate(&self, kind: &str) -> String;
}

/// `<kind>_<YYYYmmdd-HHMMSS>_<8 hex>.<ext>`
///
/// The random suffix keeps two videos from the same second apart.
#[derive(Debug, Clone)]
pub struct UniqueFilenames {
    extension: String,
}

impl UniqueFilenames {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl FilenameGenerator for UniqueFilenames {
    fn generate(&self, kind: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}_{}.{}",
            sanitize(kind),
            Local::now().format("%Y%m%d-%H%M%S"),
            &id[..8],
            self.extension
        )
    }
}

/// Replace anything that is not filename-safe with `_`
fn sanitize(kind: &str) -> String {
    let safe: String = kind
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.is_empty() {
        "video".to_string()
    } else {
        safe
    }
}
