use crate::error::ParserError;

/// Number of leading bytes to inspect for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// Check that a file is within the given size limit (0 = unlimited).
pub fn check_file_size(path: &str, size: u64, max: u64) -> Result<(), ParserError> {
    if max > 0 && size > max {
        return Err(ParserError::FileTooLarge {
            path: path.to_string(),
            size,
            max,
        });
    }
    Ok(())
}

/// Returns `true` if the buffer appears to contain binary data.
/// Detection: a NUL byte, or invalid UTF-8, within the first 8 KiB.
pub fn is_binary(content: &[u8]) -> bool {
    let check_len = content.len().min(BINARY_CHECK_SIZE);
    let head = &content[..check_len];
    if head.contains(&0) {
        return true;
    }
    match std::str::from_utf8(head) {
        Ok(_) => false,
        // An incomplete sequence at the cut point is not evidence of
        // binary data when more bytes follow the checked window.
        Err(e) => !(e.error_len().is_none() && content.len() > check_len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_not_binary() {
        assert!(!is_binary(b"fn main() {}\n"));
        assert!(!is_binary("caf\u{e9} \u{65e5}\u{672c}".as_bytes()));
        assert!(!is_binary(b""));
    }

    #[test]
    fn nul_byte_is_binary() {
        assert!(is_binary(b"hello\x00world"));
    }

    #[test]
    fn invalid_utf8_is_binary() {
        assert!(is_binary(&[0xFF, 0xFE, 0x00, 0x01]));
        assert!(is_binary(&[b'a', 0x80, b'b']));
    }

    #[test]
    fn nul_after_8k_not_detected() {
        let mut data = vec![b'a'; 10_000];
        data[9_000] = 0;
        assert!(!is_binary(&data));
    }

    #[test]
    fn multibyte_split_at_boundary_is_text() {
        // 8 KiB of ASCII then a multi-byte char straddling the check
        // window must not flag the file as binary.
        let mut data = vec![b'a'; 8_190];
        data.extend_from_slice("日本語".as_bytes());
        assert!(!is_binary(&data));
    }

    #[test]
    fn size_limits() {
        assert!(check_file_size("a.rs", 100, 100).is_ok());
        assert!(check_file_size("a.rs", 101, 100).is_err());
        assert!(check_file_size("a.rs", u64::MAX, 0).is_ok());
    }
}
