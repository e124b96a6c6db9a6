//! Reader for the kernel's assembly listing.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::DebugInfoError;

fn label_definition() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([^\s:;]+):\s*(?:;.*)?$").expect("label regex is valid")
    })
}

/// The assembly text the kernel image was assembled from.
#[derive(Debug, Clone, Default)]
pub struct AsmListing {
    lines: Vec<String>,
}

impl AsmListing {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(|l| l.trim_end().to_string()).collect(),
        }
    }

    /// # Errors
    ///
    /// Returns [`DebugInfoError::NotFound`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, DebugInfoError> {
        if !path.exists() {
            return Err(DebugInfoError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let listing = Self::from_text(&text);
        tracing::info!(
            "loaded assembly listing {} ({} lines)",
            path.display(),
            listing.lines.len()
        );
        Ok(listing)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines of every block that starts at one of `labels`, in listing order.
    ///
    /// A block is a label definition and the lines after it up to the next
    /// label definition.
    pub fn source_for_labels<S: AsRef<str>>(&self, labels: &[S]) -> Vec<String> {
        let wanted: HashSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        let re = label_definition();

        let mut out = Vec::new();
        let mut copying = false;
        for line in &self.lines {
            if let Some(caps) = re.captures(line) {
                copying = caps
                    .get(1)
                    .is_some_and(|name| wanted.contains(name.as_str()));
            }
            if copying {
                out.push(line.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Kernel_Run:
  Push EBP
  Mov EBP, ESP
Kernel_Run.IL_0000:
Kernel_Run.IL_0000.00:
  Mov EAX, 0x1 ; load
Kernel_Run.IL_0005:
  Call Screen_Write
Kernel_Run.IL_0005.00: ; after call
  Pop EBP
Screen_Write:
  Ret
";

    #[test]
    fn returns_blocks_in_listing_order() {
        let listing = AsmListing::from_text(LISTING);
        let code = listing.source_for_labels(&["Kernel_Run.IL_0005", "Kernel_Run"]);
        assert_eq!(
            code,
            vec![
                "Kernel_Run:",
                "  Push EBP",
                "  Mov EBP, ESP",
                "Kernel_Run.IL_0005:",
                "  Call Screen_Write",
            ]
        );
    }

    #[test]
    fn label_with_trailing_comment_starts_block() {
        let listing = AsmListing::from_text(LISTING);
        let code = listing.source_for_labels(&["Kernel_Run.IL_0005.00"]);
        assert_eq!(code, vec!["Kernel_Run.IL_0005.00: ; after call", "  Pop EBP"]);
    }

    #[test]
    fn empty_label_block_is_just_the_definition() {
        let listing = AsmListing::from_text(LISTING);
        let code = listing.source_for_labels(&["Kernel_Run.IL_0000"]);
        assert_eq!(code, vec!["Kernel_Run.IL_0000:"]);
    }

    #[test]
    fn unknown_labels_yield_nothing() {
        let listing = AsmListing::from_text(LISTING);
        assert!(listing.source_for_labels(&["Nope"]).is_empty());
        assert!(listing.source_for_labels::<&str>(&[]).is_empty());
    }

    #[test]
    fn load_missing_listing_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = AsmListing::load(&dir.path().join("Kernel.asm")).unwrap_err();
        assert!(matches!(err, DebugInfoError::NotFound(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Kernel.asm");
        std::fs::write(&path, LISTING).unwrap();
        let listing = AsmListing::load(&path).unwrap();
        assert_eq!(listing.len(), 12);
    }
}
