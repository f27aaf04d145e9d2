use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding as RsEncoding, BIG5, GBK, SHIFT_JIS, WINDOWS_1252};
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const UTF16_LE_BOM: &[u8] = b"\xFF\xFE";
const UTF16_BE_BOM: &[u8] = b"\xFE\xFF";
const BOM_CHAR: u16 = 0xFEFF;

/// 待辦檔案使用的行尾樣式。 / Line ending style found in a todo file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    /// 回傳寫入時使用的行尾字串。 / Returns the literal written between lines.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }
}

/// 支援的文字編碼。 / Text encodings the store can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Legacy(LegacyEncoding),
}

/// 支援的傳統多位元編碼。 / Legacy single and multi-byte encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyEncoding {
    Windows1252,
    ShiftJis,
    Gbk,
    Big5,
}

impl LegacyEncoding {
    const ALL: [LegacyEncoding; 4] = [
        LegacyEncoding::Windows1252,
        LegacyEncoding::ShiftJis,
        LegacyEncoding::Gbk,
        LegacyEncoding::Big5,
    ];

    fn codec(self) -> &'static RsEncoding {
        match self {
            LegacyEncoding::Windows1252 => WINDOWS_1252,
            LegacyEncoding::ShiftJis => SHIFT_JIS,
            LegacyEncoding::Gbk => GBK,
            LegacyEncoding::Big5 => BIG5,
        }
    }

    fn from_codec(codec: &'static RsEncoding) -> Option<Self> {
        Self::ALL.into_iter().find(|legacy| legacy.codec() == codec)
    }

    /// WHATWG 標準名稱。 / Canonical WHATWG name, e.g. `windows-1252` or `GBK`.
    pub fn name(self) -> &'static str {
        self.codec().name()
    }

    fn encode(self, text: &str) -> Result<Vec<u8>, TextError> {
        let (bytes, _, had_errors) = self.codec().encode(text);
        if had_errors {
            return Err(TextError::Unrepresentable(self.name()));
        }
        Ok(bytes.into_owned())
    }

    fn decode(self, bytes: &[u8]) -> Result<String, TextError> {
        self.codec()
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned)
            .ok_or(TextError::InvalidEncoding)
    }
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Legacy(legacy) => legacy.name(),
        }
    }

    /// 依名稱解析編碼，不分大小寫；傳統編碼接受 WHATWG 標籤。 /
    /// Parses an encoding name case-insensitively. Legacy encodings accept any WHATWG label
    /// (`latin1`, `cp1252`, `sjis`, `gb2312`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => return Some(Encoding::Utf8),
            "utf-16le" | "utf16le" | "utf16-le" => return Some(Encoding::Utf16Le),
            "utf-16be" | "utf16be" | "utf16-be" => return Some(Encoding::Utf16Be),
            _ => {}
        }
        RsEncoding::for_label(normalized.as_bytes())
            .and_then(LegacyEncoding::from_codec)
            .map(Encoding::Legacy)
    }
}

/// 文字解碼或編碼失敗。 / Failure while decoding or encoding file contents.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("file encoding is not supported or data is invalid")]
    InvalidEncoding,
    #[error("text cannot be represented in target encoding {0}")]
    Unrepresentable(&'static str),
}

/// 從磁碟偵測到的格式，寫入時沿用。 / On-disk format detected from the file; reused on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFormat {
    pub encoding: Encoding,
    pub line_ending: LineEnding,
    pub has_bom: bool,
}

impl Default for TextFormat {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            line_ending: LineEnding::Lf,
            has_bom: false,
        }
    }
}

impl TextFormat {
    /// 將文字轉為此格式的位元組；`with_bom` 控制是否前置 BOM。 / Serialises text into this format; `with_bom` controls the byte order mark prefix.
    pub fn encode(&self, text: &str, with_bom: bool) -> Result<Vec<u8>, TextError> {
        let text = normalize_newlines(text);
        let text = match self.line_ending {
            LineEnding::Lf => text,
            other => text.replace('\n', other.as_str()),
        };

        match self.encoding {
            Encoding::Utf8 => {
                let bom: &[u8] = if with_bom { UTF8_BOM } else { &[] };
                Ok([bom, text.as_bytes()].concat())
            }
            Encoding::Utf16Le => Ok(encode_utf16(&text, with_bom, false)),
            Encoding::Utf16Be => Ok(encode_utf16(&text, with_bom, true)),
            // 傳統編碼沒有 BOM。 / Legacy encodings never carry a BOM.
            Encoding::Legacy(legacy) => legacy.encode(&text),
        }
    }
}

/// 讀取待辦檔案時的選項，原樣傳遞給解碼流程。 / Options applied when reading the todo file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// 強制使用的編碼；`None` 代表自動偵測。 / Forced encoding; `None` means detect.
    pub encoding: Option<Encoding>,
    /// 略過空白行。 / Drop lines that are empty or whitespace only.
    pub skip_blank_lines: bool,
}

/// 解碼後的文字（行尾已正規化為 `\n`）與其格式。 / Decoded text, normalised to `\n`, plus its detected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub format: TextFormat,
}

/// 解碼原始位元組；`forced` 指定時跳過偵測。 / Decodes raw bytes, skipping detection when `forced` is given.
pub fn decode(bytes: &[u8], forced: Option<Encoding>) -> Result<DecodedText, TextError> {
    let encoding = match forced {
        Some(encoding) => encoding,
        None => detect_encoding(bytes)?,
    };
    let (raw, has_bom) = decode_as(bytes, encoding)?;

    Ok(DecodedText {
        format: TextFormat {
            encoding,
            line_ending: detect_line_ending(&raw),
            has_bom,
        },
        text: normalize_newlines(&raw),
    })
}

/// 將正規化後的文字切成行；結尾換行不產生空行。 / Splits normalised text into lines; a trailing newline adds no empty line.
pub fn split_lines(text: &str, options: &LoadOptions) -> Vec<String> {
    text.lines()
        .filter(|line| !options.skip_blank_lines || !line.trim().is_empty())
        .map(str::to_owned)
        .collect()
}

fn decode_as(bytes: &[u8], encoding: Encoding) -> Result<(String, bool), TextError> {
    let (bom, big_endian) = match encoding {
        Encoding::Utf8 => (UTF8_BOM, false),
        Encoding::Utf16Le => (UTF16_LE_BOM, false),
        Encoding::Utf16Be => (UTF16_BE_BOM, true),
        Encoding::Legacy(legacy) => return Ok((legacy.decode(bytes)?, false)),
    };
    let (payload, has_bom) = match bytes.strip_prefix(bom) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };
    let text = if encoding == Encoding::Utf8 {
        std::str::from_utf8(payload)
            .map(str::to_owned)
            .map_err(|_| TextError::InvalidEncoding)?
    } else {
        decode_utf16(payload, big_endian)?
    };
    Ok((text, has_bom))
}

// BOM 優先，其次是 UTF-16 啟發式、UTF-8，最後交給 chardetng。 /
// BOMs win, then the UTF-16 heuristic, then strict UTF-8, then chardetng.
fn detect_encoding(bytes: &[u8]) -> Result<Encoding, TextError> {
    let by_bom = [
        (UTF8_BOM, Encoding::Utf8),
        (UTF16_LE_BOM, Encoding::Utf16Le),
        (UTF16_BE_BOM, Encoding::Utf16Be),
    ];
    if let Some((_, encoding)) = by_bom.iter().find(|(bom, _)| bytes.starts_with(bom)) {
        return Ok(*encoding);
    }
    if looks_like_utf16(bytes, false) {
        return Ok(Encoding::Utf16Le);
    }
    if looks_like_utf16(bytes, true) {
        return Ok(Encoding::Utf16Be);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Ok(Encoding::Utf8);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    LegacyEncoding::from_codec(detector.guess(None, true))
        .map(Encoding::Legacy)
        .ok_or(TextError::InvalidEncoding)
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String, TextError> {
    if bytes.len() % 2 != 0 {
        return Err(TextError::InvalidEncoding);
    }
    let read: fn([u8; 2]) -> u16 = if big_endian {
        u16::from_be_bytes
    } else {
        u16::from_le_bytes
    };
    let units = bytes.chunks_exact(2).map(|pair| read([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| TextError::InvalidEncoding)
}

fn encode_utf16(text: &str, with_bom: bool, big_endian: bool) -> Vec<u8> {
    let write: fn(u16) -> [u8; 2] = if big_endian {
        u16::to_be_bytes
    } else {
        u16::to_le_bytes
    };
    with_bom
        .then_some(BOM_CHAR)
        .into_iter()
        .chain(text.encode_utf16())
        .flat_map(write)
        .collect()
}

// 取前 64 位元組，若高位（或低位）多為 0 則視為 UTF-16。 / Sample the first 64 bytes; mostly-zero high (or low) bytes suggest UTF-16.
fn looks_like_utf16(bytes: &[u8], big_endian: bool) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    let high = usize::from(!big_endian);
    let pairs = bytes[..bytes.len().min(64)].chunks_exact(2);
    let total = pairs.len();
    let zeros = pairs.filter(|pair| pair[high] == 0).count();
    zeros * 2 >= total
}

/// 以第一個換行記號推斷行尾偏好。 / Infers the line ending from the first newline sequence.
fn detect_line_ending(text: &str) -> LineEnding {
    let bytes = text.as_bytes();
    match bytes.iter().position(|b| *b == b'\r' || *b == b'\n') {
        Some(idx) if bytes[idx] == b'\n' => LineEnding::Lf,
        Some(idx) if bytes.get(idx + 1) == Some(&b'\n') => LineEnding::CrLf,
        Some(_) => LineEnding::Cr,
        None => LineEnding::Lf,
    }
}

fn normalize_newlines(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::GBK;

    #[test]
    fn decode_detects_crlf_and_normalises() {
        let decoded = decode(b"(A) call mom\r\nbuy milk\r\n", None).unwrap();
        assert_eq!(decoded.text, "(A) call mom\nbuy milk\n");
        assert_eq!(decoded.format.line_ending, LineEnding::CrLf);
        assert_eq!(decoded.format.encoding, Encoding::Utf8);
        assert!(!decoded.format.has_bom);
    }

    #[test]
    fn decode_strips_utf8_bom() {
        let decoded = decode(b"\xEF\xBB\xBFx done\n", None).unwrap();
        assert_eq!(decoded.text, "x done\n");
        assert!(decoded.format.has_bom);
    }

    #[test]
    fn decode_handles_utf16_le_bom() {
        // BOM 加上 "hi\r\n!"。 / BOM plus the literal "hi\r\n!".
        let payload: &[u8] = b"\xFF\xFEh\x00i\x00\r\x00\n\x00!\x00";
        let decoded = decode(payload, None).unwrap();
        assert_eq!(decoded.text, "hi\n!");
        assert_eq!(decoded.format.encoding, Encoding::Utf16Le);
        assert_eq!(decoded.format.line_ending, LineEnding::CrLf);
    }

    #[test]
    fn decode_detects_gbk() {
        let (encoded, _, _) = GBK.encode("中文測試");
        let decoded = decode(&encoded, None).unwrap();
        assert_eq!(decoded.text, "中文測試");
        assert_eq!(
            decoded.format.encoding,
            Encoding::Legacy(LegacyEncoding::Gbk)
        );
    }

    #[test]
    fn forced_encoding_skips_detection() {
        let decoded = decode(b"caf\xE9", Some(Encoding::from_name("latin1").unwrap())).unwrap();
        assert_eq!(decoded.text, "café");

        let err = decode(b"caf\xE9", Some(Encoding::Utf8)).unwrap_err();
        assert_eq!(err, TextError::InvalidEncoding);
    }

    #[test]
    fn split_lines_ignores_trailing_newline_and_optionally_blanks() {
        let text = "a\n\n  \nb\n";
        assert_eq!(
            split_lines(text, &LoadOptions::default()),
            vec!["a", "", "  ", "b"]
        );

        let options = LoadOptions {
            skip_blank_lines: true,
            ..LoadOptions::default()
        };
        assert_eq!(split_lines(text, &options), vec!["a", "b"]);
        assert!(split_lines("", &options).is_empty());
    }

    #[test]
    fn encode_applies_line_ending_and_bom() {
        let format = TextFormat {
            encoding: Encoding::Utf8,
            line_ending: LineEnding::CrLf,
            has_bom: true,
        };
        let bytes = format.encode("a\nb\r\n", true).unwrap();
        assert_eq!(bytes, b"\xEF\xBB\xBFa\r\nb\r\n");

        let appended = format.encode("c\n", false).unwrap();
        assert_eq!(appended, b"c\r\n");
    }

    #[test]
    fn utf16_round_trips_with_bom_and_rejects_odd_length() {
        let format = TextFormat {
            encoding: Encoding::Utf16Be,
            line_ending: LineEnding::Lf,
            has_bom: true,
        };
        let bytes = format.encode("ok\n", true).unwrap();
        assert_eq!(bytes, b"\xFE\xFF\x00o\x00k\x00\n");
        assert_eq!(decode(&bytes, None).unwrap().format, format);

        assert_eq!(
            decode(b"\xFF\xFEa\x00b", None).unwrap_err(),
            TextError::InvalidEncoding
        );
    }

    #[test]
    fn encode_rejects_unrepresentable_text() {
        let format = TextFormat {
            encoding: Encoding::Legacy(LegacyEncoding::Windows1252),
            ..TextFormat::default()
        };
        assert_eq!(
            format.encode("漢", false).unwrap_err(),
            TextError::Unrepresentable("windows-1252")
        );
    }

    #[test]
    fn encoding_names_accept_aliases() {
        assert_eq!(Encoding::from_name("UTF8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("utf16_be"), Some(Encoding::Utf16Be));
        assert_eq!(
            Encoding::from_name("sjis"),
            Some(Encoding::Legacy(LegacyEncoding::ShiftJis))
        );
        assert_eq!(
            Encoding::from_name("cp1252"),
            Some(Encoding::Legacy(LegacyEncoding::Windows1252))
        );
        assert_eq!(Encoding::Legacy(LegacyEncoding::Gbk).name(), "GBK");
        assert_eq!(Encoding::from_name("klingon"), None);
        assert_eq!(Encoding::from_name("utf-7"), None);
    }
}
