use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::Transcript;

/// Render a transcript in the requested format
pub fn render(transcript: &Transcript, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(transcript.text.clone()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(transcript).context("Failed to serialize transcript")
        }
    }
}

/// Save transcript to file
pub async fn save_to_file(transcript: &Transcript, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(transcript, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print transcript to console
pub fn print_to_console(transcript: &Transcript, format: &OutputFormat) -> Result<()> {
    println!("{}", render(transcript, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::{CaptionTrack, VideoMetadata};

    fn transcript() -> Transcript {
        Transcript {
            text: "Olá\nTchau".to_string(),
            track: CaptionTrack::AutoPortuguese,
            metadata: VideoMetadata {
                video_id: "abc".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_render_text() {
        assert_eq!(render(&transcript(), &OutputFormat::Text).unwrap(), "Olá\nTchau");
    }

    #[test]
    fn test_render_json() {
        let json = render(&transcript(), &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["text"], "Olá\nTchau");
        assert_eq!(value["track"], "AutoPortuguese");
        assert_eq!(value["metadata"]["video_id"], "abc");
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        tokio_test::block_on(save_to_file(&transcript(), &path, &OutputFormat::Text)).unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "Olá\nTchau");
    }
}
