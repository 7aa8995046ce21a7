use bytes::{Buf, BufMut, TryGetError};
use thiserror::Error;


/// Failure to decode a datagram. There is deliberately just one variant: a malformed datagram
///  is discarded (server) or ignored (client) regardless of which field was broken, and the
///  reason only matters for the log line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{0}")]
    Malformed(&'static str),
}

impl From<TryGetError> for DecodeError {
    fn from(_: TryGetError) -> Self {
        DecodeError::Malformed("buffer underflow")
    }
}

/// Strings go on the wire as a 4-byte big-endian byte length followed by that many bytes of
///  UTF-8. The length counts bytes, not code points.
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

pub fn try_get_string(buf: &mut impl Buf) -> Result<String, DecodeError> {
    let len = buf.try_get_i32()?;
    if len < 0 {
        return Err(DecodeError::Malformed("negative string length"));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(DecodeError::Malformed("string length exceeds remaining bytes"));
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| DecodeError::Malformed("string is not valid UTF-8"))
}

/// Number of bytes a string occupies on the wire, for pre-measuring payload buffers.
pub fn string_len(s: &str) -> usize {
    4 + s.len()
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty("", vec![0, 0, 0, 0])]
    #[case::a("a", vec![0, 0, 0, 1, 97])]
    #[case::abc("abc", vec![0, 0, 0, 3, 97, 98, 99])]
    #[case::umlaut("ä", vec![0, 0, 0, 2, 0xc3, 0xa4])]
    #[case::heart("❤️", vec![0, 0, 0, 6, 226, 157, 164, 239, 184, 143])]
    fn test_put_string(#[case] s: &str, #[case] expected: Vec<u8>) {
        let mut buf = BytesMut::new();
        put_string(&mut buf, s);
        assert_eq!(&buf, &expected);
        assert_eq!(buf.len(), string_len(s));

        let mut deser_buf: &[u8] = &buf;
        let deser = try_get_string(&mut deser_buf).unwrap();
        assert!(deser_buf.is_empty());
        assert_eq!(&deser, s);
    }

    #[test]
    fn test_try_get_string_remaining() {
        let mut buf: &[u8] = b"\0\0\0\x01abc";
        let actual = try_get_string(&mut buf).unwrap();
        assert_eq!(&actual, "a");
        assert_eq!(buf, b"bc");
    }

    #[test]
    fn test_try_get_string_too_short() {
        let mut buf: &[u8] = b"\0\0\0\x02a";
        let actual = try_get_string(&mut buf);
        assert_eq!(
            actual,
            Err(DecodeError::Malformed("string length exceeds remaining bytes"))
        );
    }

    #[test]
    fn test_try_get_string_negative_length() {
        let mut buf: &[u8] = b"\xff\xff\xff\xffabcd";
        let actual = try_get_string(&mut buf);
        assert_eq!(actual, Err(DecodeError::Malformed("negative string length")));
    }

    #[test]
    fn test_try_get_string_truncated_length() {
        let mut buf: &[u8] = b"\0\0";
        assert!(try_get_string(&mut buf).is_err());
    }

    #[test]
    fn test_try_get_string_not_unicode() {
        let mut buf: &[u8] = b"\0\0\0\x02\xc0\xaf";
        let actual = try_get_string(&mut buf);
        assert_eq!(actual, Err(DecodeError::Malformed("string is not valid UTF-8")));
    }
}
