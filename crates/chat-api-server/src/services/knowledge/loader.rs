use anyhow::{anyhow, Context, Result};
use encoding_rs::{Encoding, WINDOWS_1252};
use lopdf::Document as PdfDocument;
use pulldown_cmark::{Event, Parser as MdParser, TagEnd};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Path relative to the documents directory.
    pub source: String,
    pub content: String,
}

pub struct DocumentLoader;

impl DocumentLoader {
    /// Recursively load every supported file under `dir`, in path order.
    /// Files that fail to parse are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Vec<LoadedDocument>> {
        let mut files = Vec::new();
        collect_files(dir, &mut files)
            .with_context(|| format!("Failed to read documents directory {}", dir.display()))?;
        files.sort();

        let mut documents = Vec::new();
        for path in files {
            if !Self::is_supported(&path) {
                debug!("Skipping unsupported file {:?}", path);
                continue;
            }
            match Self::load_file(&path) {
                Ok(content) if content.trim().is_empty() => {
                    debug!("Skipping empty document {:?}", path);
                }
                Ok(content) => {
                    let source = path
                        .strip_prefix(dir)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    documents.push(LoadedDocument { source, content });
                }
                Err(e) => warn!("Failed to load {:?}: {:#}", path, e),
            }
        }
        Ok(documents)
    }

    pub fn is_supported(path: &Path) -> bool {
        matches!(extension(path).as_deref(), Some("txt" | "md" | "pdf"))
    }

    pub fn load_file(path: &Path) -> Result<String> {
        let ext = extension(path).ok_or_else(|| anyhow!("No file extension"))?;
        let content = match ext.as_str() {
            "pdf" => Self::parse_pdf(path)?,
            "md" => Self::parse_markdown(&decode_text(&fs::read(path)?)),
            "txt" => decode_text(&fs::read(path)?),
            other => anyhow::bail!("Unsupported document type: {}", other),
        };
        debug!("Loaded {} characters from {:?}", content.len(), path);
        Ok(content)
    }

    fn parse_pdf(path: &Path) -> Result<String> {
        let doc = PdfDocument::load(path).context("Failed to load PDF file")?;
        let mut content = String::new();

        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => warn!("Failed to extract text from page {}: {}", page_num, e),
            }
        }
        Ok(content)
    }

    /// Plain text of a markdown document, one line per block.
    fn parse_markdown(source: &str) -> String {
        let mut text = String::new();
        for event in MdParser::new(source) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak
                | Event::HardBreak
                | Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::TableRow,
                ) => {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }
        text.trim_end().to_string()
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// UTF-8 (BOM-aware), falling back to Windows-1252.
fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_with_bom_removal(bytes);
        return text.into_owned();
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_to_plain_text() {
        let text = DocumentLoader::parse_markdown("# Title\n\nSome *bold* text with `code`.\n\n- item one\n- item two\n");
        assert_eq!(text, "Title\nSome bold text with code.\nitem one\nitem two");
    }

    #[test]
    fn test_decode_fallbacks() {
        assert_eq!(decode_text("héllo".as_bytes()), "héllo");
        assert_eq!(decode_text(b"\xEF\xBB\xBFbom"), "bom");
        // 0xE9 is 'é' in Windows-1252 and invalid UTF-8 on its own.
        assert_eq!(decode_text(b"caf\xE9"), "café");
    }

    #[test]
    fn test_load_dir_filters_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha text").unwrap();
        fs::write(dir.path().join("b.md"), "# Beta\n\nbody").unwrap();
        fs::write(dir.path().join("c.csv"), "x,y").unwrap();
        fs::write(dir.path().join("empty.txt"), "   ").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.txt"), "delta").unwrap();

        let docs = DocumentLoader::load_dir(dir.path()).unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.replace('\\', "/")).collect();

        assert_eq!(sources, vec!["a.txt", "b.md", "nested/d.txt"]);
        assert_eq!(docs[1].content, "Beta\nbody");
    }

    #[test]
    fn test_broken_pdf_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), "not a pdf").unwrap();
        fs::write(dir.path().join("ok.txt"), "fine").unwrap();

        let docs = DocumentLoader::load_dir(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "ok.txt");
    }
}
