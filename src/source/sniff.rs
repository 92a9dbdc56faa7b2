//! Content type identification from leading bytes

/// Content types understood by the built-in unwrappers
pub mod mime {
    pub const GZIP: &str = "application/gzip";
    pub const X_GZIP: &str = "application/x-gzip";
    pub const TAR: &str = "application/x-tar";
    pub const ZIP: &str = "application/zip";
    pub const VCARD: &str = "text/vcard";
    pub const X_VCARD: &str = "text/x-vcard";
    /// A single directory entry such as one contact taken out of a vCard file
    pub const DIRECTORY: &str = "text/directory";
    pub const MBOX: &str = "application/mbox";
    pub const RFC822: &str = "message/rfc822";
    pub const TEXT: &str = "text/plain";
}

/// Offset of the `ustar` magic inside a tar header block
const TAR_MAGIC_OFFSET: usize = 257;

/// Identifies the content type of a stream
pub trait ContentSniffer: Send {
    /// Identifies a content type from the first bytes of a stream
    ///
    /// # Arguments
    ///
    /// * `head` - Leading bytes of the stream (may be shorter than requested)
    /// * `hint_path` - Identifier or path of the resource, for extension checks
    fn identify(&self, head: &[u8], hint_path: Option<&str>) -> Option<String>;
}

/// Sniffer recognising the container formats the crate can unwrap
///
/// Magic bytes win over file extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

impl MagicSniffer {
    fn from_magic(head: &[u8]) -> Option<&'static str> {
        if head.starts_with(&[0x1f, 0x8b]) {
            return Some(mime::GZIP);
        }

        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            return Some(mime::ZIP);
        }

        if head.len() >= TAR_MAGIC_OFFSET + 5
            && &head[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
        {
            return Some(mime::TAR);
        }

        let text = strip_bom(head);
        let text_start = text
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|i| &text[i..])
            .unwrap_or(&[]);
        if starts_with_ignore_case(text_start, b"BEGIN:VCARD") {
            return Some(mime::VCARD);
        }

        if text.starts_with(b"From ") {
            return Some(mime::MBOX);
        }

        None
    }

    fn from_extension(hint_path: &str) -> Option<&'static str> {
        let name = hint_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(hint_path)
            .to_ascii_lowercase();
        let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;

        match extension {
            "gz" | "tgz" => Some(mime::GZIP),
            "tar" => Some(mime::TAR),
            "zip" => Some(mime::ZIP),
            "vcf" | "vcard" => Some(mime::VCARD),
            "mbox" | "mbx" => Some(mime::MBOX),
            "eml" => Some(mime::RFC822),
            "txt" | "text" => Some(mime::TEXT),
            _ => None,
        }
    }
}

impl ContentSniffer for MagicSniffer {
    fn identify(&self, head: &[u8], hint_path: Option<&str>) -> Option<String> {
        Self::from_magic(head)
            .or_else(|| hint_path.and_then(Self::from_extension))
            .map(str::to_string)
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xef, 0xbb, 0xbf]).unwrap_or(bytes)
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}
