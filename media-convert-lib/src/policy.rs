//! Format policy table
//!
//! Which target formats each media kind accepts, what MIME type each produces,
//! which strategy converts it and how the external tool is invoked. Pure
//! lookups, no I/O. Program names are not part of the table; callers supply
//! them from configuration.

use serde::Serialize;
use std::path::Path;

use crate::types::MediaKind;

/// How a (kind, format) pair is converted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Decode compressed audio frames and write a WAV container in-process
    InProcessPcm,
    /// Delegate to the transcoder (`ffmpeg`), writing a single output file
    Transcoder,
    /// Delegate to the headless document converter (`soffice`), writing into an output directory
    DocumentConverter,
}

/// One supported target format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatEntry {
    pub format: &'static str,
    pub mime_type: &'static str,
    pub strategy: Strategy,
}

const fn entry(format: &'static str, mime_type: &'static str, strategy: Strategy) -> FormatEntry {
    FormatEntry {
        format,
        mime_type,
        strategy,
    }
}

const AUDIO: &[FormatEntry] = &[
    entry("wav", "audio/wav", Strategy::InProcessPcm),
    entry("mp3", "audio/mpeg", Strategy::Transcoder),
];

const IMAGE: &[FormatEntry] = &[
    entry("jpg", "image/jpeg", Strategy::Transcoder),
    entry("jpeg", "image/jpeg", Strategy::Transcoder),
    entry("png", "image/png", Strategy::Transcoder),
    entry("bmp", "image/bmp", Strategy::Transcoder),
    entry("tiff", "image/tiff", Strategy::Transcoder),
    entry("webp", "image/webp", Strategy::Transcoder),
];

const VIDEO: &[FormatEntry] = &[
    entry("mp4", "video/mp4", Strategy::Transcoder),
    entry("mkv", "video/x-matroska", Strategy::Transcoder),
    entry("mov", "video/quicktime", Strategy::Transcoder),
    entry("avi", "video/x-msvideo", Strategy::Transcoder),
    entry("webm", "video/webm", Strategy::Transcoder),
];

const DOCUMENT: &[FormatEntry] = &[
    entry(
        "pdf",
        "application/pdf",
        Strategy::DocumentConverter,
    ),
    entry(
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Strategy::DocumentConverter,
    ),
    entry(
        "odt",
        "application/vnd.oasis.opendocument.text",
        Strategy::DocumentConverter,
    ),
];

/// Every format supported for `kind`, in table order
pub fn entries(kind: MediaKind) -> &'static [FormatEntry] {
    match kind {
        MediaKind::Audio => AUDIO,
        MediaKind::Image => IMAGE,
        MediaKind::Video => VIDEO,
        MediaKind::Document => DOCUMENT,
    }
}

/// Table row for a supported pair, format matched case-insensitively
pub fn entry_for(kind: MediaKind, format: &str) -> Option<&'static FormatEntry> {
    let format = format.trim();
    entries(kind)
        .iter()
        .find(|e| e.format.eq_ignore_ascii_case(format))
}

pub fn is_supported(kind: MediaKind, format: &str) -> bool {
    entry_for(kind, format).is_some()
}

pub fn mime_type_for(kind: MediaKind, format: &str) -> Option<&'static str> {
    entry_for(kind, format).map(|e| e.mime_type)
}

pub fn strategy_for(kind: MediaKind, format: &str) -> Option<Strategy> {
    entry_for(kind, format).map(|e| e.strategy)
}

pub fn supported_formats(kind: MediaKind) -> Vec<&'static str> {
    entries(kind).iter().map(|e| e.format).collect()
}

/// Comma separated list for error messages
pub fn supported_formats_display(kind: MediaKind) -> String {
    supported_formats(kind).join(", ")
}

/// Argument vector for the external tool, without the program name.
///
/// For the transcoder `output` is the output file; for the document converter
/// it is the output directory. Returns `None` for unsupported pairs and for
/// formats converted in-process.
pub fn tool_arguments_for(
    kind: MediaKind,
    format: &str,
    input: &Path,
    output: &Path,
) -> Option<Vec<String>> {
    let entry = entry_for(kind, format)?;
    match entry.strategy {
        Strategy::InProcessPcm => None,
        Strategy::Transcoder => Some(transcoder_arguments(kind, input, output)),
        Strategy::DocumentConverter => Some(document_converter_arguments(entry.format, input, output)),
    }
}

/// `-y -i <in> [filters] <out>`
pub fn transcoder_arguments(kind: MediaKind, input: &Path, output: &Path) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    let filters: &[&str] = match kind {
        MediaKind::Audio => &["-codec:a", "libmp3lame"],
        MediaKind::Image => &["-vf", "scale=1920:-1"],
        MediaKind::Video | MediaKind::Document => &[],
    };

    let mut args = vec!["-y".to_string(), "-i".to_string(), input.into_owned()];
    args.extend(filters.iter().map(|f| f.to_string()));
    args.push(output.into_owned());
    args
}

/// `--headless --convert-to <target> --outdir <dir> <in>`
pub fn document_converter_arguments(format: &str, input: &Path, outdir: &Path) -> Vec<String> {
    let target = match format {
        "pdf" => "pdf:writer_pdf_Export",
        other => other,
    };
    vec![
        "--headless".to_string(),
        "--convert-to".to_string(),
        target.to_string(),
        "--outdir".to_string(),
        outdir.to_string_lossy().into_owned(),
        input.to_string_lossy().into_owned(),
    ]
}

/// Serializable view of one table row
#[derive(Debug, Clone, Serialize)]
pub struct KindPolicy {
    pub kind: MediaKind,
    pub formats: &'static [FormatEntry],
}

/// The whole table, for listing endpoints
pub fn table() -> Vec<KindPolicy> {
    MediaKind::ALL
        .iter()
        .map(|&kind| KindPolicy {
            kind,
            formats: entries(kind),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_every_supported_pair_has_mime() {
        for kind in MediaKind::ALL {
            for format in supported_formats(kind) {
                assert!(is_supported(kind, format));
                let mime = mime_type_for(kind, format).unwrap();
                let (ty, sub) = mime.split_once('/').unwrap();
                assert!(!ty.is_empty() && !sub.is_empty(), "{kind}/{format}: {mime}");
                assert!(strategy_for(kind, format).is_some());
            }
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_supported(MediaKind::Image, "PNG"));
        assert_eq!(mime_type_for(MediaKind::Video, "MKV"), Some("video/x-matroska"));
        assert_eq!(strategy_for(MediaKind::Audio, "Wav"), Some(Strategy::InProcessPcm));
    }

    #[test]
    fn test_kinds_do_not_leak() {
        assert!(!is_supported(MediaKind::Audio, "png"));
        assert!(!is_supported(MediaKind::Document, "mp4"));
        assert!(!is_supported(MediaKind::Image, "gif"));
        assert_eq!(mime_type_for(MediaKind::Video, "wav"), None);
    }

    #[test]
    fn test_jpeg_aliases() {
        assert_eq!(mime_type_for(MediaKind::Image, "jpg"), Some("image/jpeg"));
        assert_eq!(mime_type_for(MediaKind::Image, "jpeg"), Some("image/jpeg"));
    }

    #[test]
    fn test_transcoder_arguments() {
        let input = PathBuf::from("/tmp/in.mov");
        let output = PathBuf::from("/tmp/out.mp4");

        let args = tool_arguments_for(MediaKind::Video, "mp4", &input, &output).unwrap();
        assert_eq!(args, vec!["-y", "-i", "/tmp/in.mov", "/tmp/out.mp4"]);

        let args = tool_arguments_for(MediaKind::Image, "webp", &input, &output).unwrap();
        assert_eq!(args[3..5], ["-vf".to_string(), "scale=1920:-1".to_string()]);

        let args = tool_arguments_for(MediaKind::Audio, "mp3", &input, &output).unwrap();
        assert!(args.windows(2).any(|w| w == ["-codec:a", "libmp3lame"]));
    }

    #[test]
    fn test_document_arguments() {
        let input = PathBuf::from("/tmp/report.docx");
        let outdir = PathBuf::from("/tmp/document_conversion_x");

        let args = tool_arguments_for(MediaKind::Document, "PDF", &input, &outdir).unwrap();
        assert_eq!(
            args,
            vec![
                "--headless",
                "--convert-to",
                "pdf:writer_pdf_Export",
                "--outdir",
                "/tmp/document_conversion_x",
                "/tmp/report.docx"
            ]
        );

        let args = tool_arguments_for(MediaKind::Document, "odt", &input, &outdir).unwrap();
        assert_eq!(args[2], "odt");
    }

    #[test]
    fn test_every_tool_row_has_arguments() {
        let p = PathBuf::from("/x");
        for kind in MediaKind::ALL {
            for entry in entries(kind) {
                let args = tool_arguments_for(kind, entry.format, &p, &p);
                match entry.strategy {
                    Strategy::InProcessPcm => assert!(args.is_none()),
                    Strategy::Transcoder => {
                        assert_eq!(args, Some(transcoder_arguments(kind, &p, &p)))
                    }
                    Strategy::DocumentConverter => assert_eq!(
                        args,
                        Some(document_converter_arguments(entry.format, &p, &p))
                    ),
                }
            }
        }
    }

    #[test]
    fn test_in_process_has_no_tool_arguments() {
        let p = PathBuf::from("/x");
        assert!(tool_arguments_for(MediaKind::Audio, "wav", &p, &p).is_none());
        assert!(tool_arguments_for(MediaKind::Audio, "flac", &p, &p).is_none());
    }

    #[test]
    fn test_table_serializes() {
        let json = serde_json::to_value(table()).unwrap();
        assert_eq!(json[0]["kind"], "audio");
        assert_eq!(json[0]["formats"][0]["strategy"], "in_process_pcm");
        assert_eq!(json[3]["formats"].as_array().unwrap().len(), 3);
    }
}
