//! DICOM Part-10 reader
//!
//! Supports little-endian implicit and explicit VR datasets, nested
//! sequences of defined and undefined length, and skips encapsulated
//! (compressed) pixel data. Big-endian and deflated transfer syntaxes are
//! refused.

use super::dictionary;
use super::record::{Element, ElementValue, Record, Tag, Vr};
use super::{tags, CodecError, ImageCodec};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

const PREAMBLE_LEN: u64 = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Deepest sequence nesting accepted before a file is treated as malformed
pub const MAX_SEQUENCE_DEPTH: usize = 64;

const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
const ITEM_DELIMITER: Tag = Tag::new(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITER: Tag = Tag::new(0xFFFE, 0xE0DD);

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

/// Reader for `.dcm` files on local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomCodec;

impl DicomCodec {
    pub fn new() -> Self {
        Self
    }

    fn parse(&self, path: &Path, options: ReadOptions) -> Result<Record, CodecError> {
        let mut file = File::open(path)?;
        let start = locate_dataset(&mut file, path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut parser = Parser::new(BufReader::new(file), start);

        let mut record = Record::new();
        if start == PREAMBLE_LEN + MAGIC.len() as u64 || parser.peek_group()? == Some(0x0002) {
            parser.read_meta(&mut record)?;
        }

        let syntax = record
            .string(tags::TRANSFER_SYNTAX_UID)
            .unwrap_or(IMPLICIT_VR_LITTLE_ENDIAN)
            .to_string();
        parser.explicit = match syntax.as_str() {
            IMPLICIT_VR_LITTLE_ENDIAN => false,
            EXPLICIT_VR_BIG_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => {
                return Err(CodecError::invalid(
                    "TransferSyntaxUID",
                    format!("transfer syntax {} is not supported", syntax),
                ))
            }
            // Native explicit LE and every compressed syntax share the dataset encoding
            _ => true,
        };
        trace!(file = %path.display(), transfer_syntax = %syntax, "Parsing dataset");

        parser.read_dataset(&mut record, None, 0, &options)?;
        Ok(record)
    }
}

impl ImageCodec for DicomCodec {
    fn probe_header_field(&self, path: &Path, tag: Tag) -> Result<Option<String>, CodecError> {
        let record = self.parse(
            path,
            ReadOptions {
                stop_after: Some(tag),
                include_payload: false,
            },
        )?;
        Ok(record.string(tag).map(str::to_string))
    }

    fn read_record(&self, path: &Path, include_payload: bool) -> Result<Record, CodecError> {
        self.parse(
            path,
            ReadOptions {
                stop_after: None,
                include_payload,
            },
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadOptions {
    /// Stop at the first top-level element past this tag
    stop_after: Option<Tag>,
    include_payload: bool,
}

/// Offset of the first element: after the preamble and magic when present,
/// else the start of the file for preamble-less datasets.
fn locate_dataset(file: &mut File, path: &Path) -> Result<u64, CodecError> {
    let mut head = [0u8; 132];
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..])? {
            0 => break,
            n => filled += n,
        }
    }

    if filled == head.len() && &head[128..132] == MAGIC {
        return Ok(PREAMBLE_LEN + MAGIC.len() as u64);
    }

    // No preamble: accept streams that start with a meta or identifying group
    if filled >= 8 {
        let group = u16::from_le_bytes([head[0], head[1]]);
        if matches!(group, 0x0002 | 0x0008) {
            return Ok(0);
        }
    }

    Err(CodecError::NotDicom(format!(
        "{} has no DICM marker",
        path.display()
    )))
}

struct Header {
    tag: Tag,
    vr: Vr,
    length: u32,
}

struct Parser<R> {
    reader: R,
    pos: u64,
    explicit: bool,
    pending: Option<Tag>,
}

impl<R: Read> Parser<R> {
    fn new(reader: R, pos: u64) -> Self {
        Self {
            reader,
            pos,
            explicit: true,
            pending: None,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += filled as u64;
        Ok(filled)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        let filled = self.fill(buf)?;
        if filled < buf.len() {
            return Err(CodecError::Malformed(format!(
                "unexpected end of data at offset {}",
                self.pos
            )));
        }
        Ok(())
    }

    fn read_u16(&mut self) -> Result<u16, CodecError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_vec(&mut self, length: u32) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(u64::from(length)).read_to_end(&mut buf)?;
        self.pos += read as u64;
        if read < length as usize {
            return Err(CodecError::Malformed(format!(
                "value of {} bytes truncated at offset {}",
                length, self.pos
            )));
        }
        Ok(buf)
    }

    fn skip(&mut self, length: u32) -> Result<(), CodecError> {
        let skipped = io::copy(&mut (&mut self.reader).take(u64::from(length)), &mut io::sink())?;
        self.pos += skipped;
        if skipped < u64::from(length) {
            return Err(CodecError::Malformed(format!(
                "value of {} bytes truncated at offset {}",
                length, self.pos
            )));
        }
        Ok(())
    }

    /// Read the next tag; `None` at a clean end of data
    fn read_tag(&mut self) -> Result<Option<Tag>, CodecError> {
        if let Some(tag) = self.pending.take() {
            return Ok(Some(tag));
        }
        let mut buf = [0u8; 4];
        match self.fill(&mut buf)? {
            0 => Ok(None),
            4 => Ok(Some(Tag::new(
                u16::from_le_bytes([buf[0], buf[1]]),
                u16::from_le_bytes([buf[2], buf[3]]),
            ))),
            _ => Err(CodecError::Malformed(format!(
                "truncated element tag at offset {}",
                self.pos
            ))),
        }
    }

    fn peek_group(&mut self) -> Result<Option<u16>, CodecError> {
        let tag = self.read_tag()?;
        self.pending = tag;
        Ok(tag.map(|t| t.group))
    }

    fn read_header(&mut self) -> Result<Option<Header>, CodecError> {
        let Some(tag) = self.read_tag()? else {
            return Ok(None);
        };

        if tag.group == 0xFFFE {
            let length = self.read_u32()?;
            return Ok(Some(Header {
                tag,
                vr: Vr::UN,
                length,
            }));
        }

        if self.explicit {
            let mut vr = [0u8; 2];
            self.read_exact(&mut vr)?;
            let vr = Vr(vr);
            let length = if vr.has_long_length() {
                self.read_u16()?;
                self.read_u32()?
            } else {
                u32::from(self.read_u16()?)
            };
            Ok(Some(Header { tag, vr, length }))
        } else {
            let length = self.read_u32()?;
            let vr = dictionary::vr(tag).unwrap_or(if length == UNDEFINED_LENGTH {
                Vr::SQ
            } else {
                Vr::UN
            });
            Ok(Some(Header { tag, vr, length }))
        }
    }

    /// File meta group, always explicit VR little endian
    fn read_meta(&mut self, record: &mut Record) -> Result<(), CodecError> {
        let explicit = self.explicit;
        self.explicit = true;
        loop {
            match self.read_tag()? {
                Some(tag) if tag.group == 0x0002 => {
                    self.pending = Some(tag);
                    let Some(header) = self.read_header()? else {
                        break;
                    };
                    let value = self.read_value(&header, 1, &ReadOptions {
                        stop_after: None,
                        include_payload: false,
                    })?;
                    record.insert(Element::new(header.tag, header.vr, value));
                }
                other => {
                    self.pending = other;
                    break;
                }
            }
        }
        self.explicit = explicit;
        Ok(())
    }

    /// Read elements into `record` until `end`, an item delimiter, or the
    /// end of data
    fn read_dataset(
        &mut self,
        record: &mut Record,
        end: Option<u64>,
        depth: usize,
        options: &ReadOptions,
    ) -> Result<(), CodecError> {
        loop {
            if end.is_some_and(|end| self.pos >= end) {
                break;
            }
            // Decide on the tag alone so a probe never reads past its field
            if let (0, Some(limit)) = (depth, options.stop_after) {
                match self.read_tag()? {
                    Some(tag) if tag > limit => break,
                    tag => self.pending = tag,
                }
            }
            let Some(header) = self.read_header()? else {
                if end.is_some() {
                    return Err(CodecError::Malformed("item truncated".to_string()));
                }
                break;
            };
            if header.tag == ITEM_DELIMITER || header.tag == SEQUENCE_DELIMITER {
                break;
            }

            if depth == 0 {
                if header.tag == tags::PIXEL_DATA
                    && !options.include_payload
                    && header.length != UNDEFINED_LENGTH
                {
                    record.insert(Element::new(
                        header.tag,
                        header.vr,
                        ElementValue::Deferred {
                            length: header.length,
                        },
                    ));
                    break;
                }
            }

            let value = self.read_value(&header, depth, options)?;
            let tag = header.tag;
            record.insert(Element::new(header.tag, header.vr, value));
            if depth == 0 && options.stop_after.is_some_and(|limit| tag >= limit) {
                break;
            }
        }
        Ok(())
    }

    fn read_value(
        &mut self,
        header: &Header,
        depth: usize,
        options: &ReadOptions,
    ) -> Result<ElementValue, CodecError> {
        if header.tag == tags::PIXEL_DATA && header.length == UNDEFINED_LENGTH {
            return self.skip_fragments();
        }
        if header.vr == Vr::SQ || header.length == UNDEFINED_LENGTH {
            return self.read_sequence(header.length, depth, options);
        }
        let bytes = self.read_vec(header.length)?;
        Ok(decode_value(header.vr, bytes))
    }

    fn read_sequence(
        &mut self,
        length: u32,
        depth: usize,
        options: &ReadOptions,
    ) -> Result<ElementValue, CodecError> {
        if depth >= MAX_SEQUENCE_DEPTH {
            return Err(CodecError::Malformed(format!(
                "sequences nested deeper than {} levels at offset {}",
                MAX_SEQUENCE_DEPTH, self.pos
            )));
        }
        let end = (length != UNDEFINED_LENGTH).then(|| self.pos + u64::from(length));
        let mut items = Vec::new();
        loop {
            if end.is_some_and(|end| self.pos >= end) {
                break;
            }
            let Some(tag) = self.read_tag()? else {
                return Err(CodecError::Malformed("sequence truncated".to_string()));
            };
            let item_length = self.read_u32()?;
            match tag {
                ITEM => {
                    let item_end =
                        (item_length != UNDEFINED_LENGTH).then(|| self.pos + u64::from(item_length));
                    let mut item = Record::new();
                    self.read_dataset(&mut item, item_end, depth + 1, options)?;
                    items.push(item);
                }
                SEQUENCE_DELIMITER => break,
                other => {
                    return Err(CodecError::Malformed(format!(
                        "unexpected {} inside a sequence",
                        other
                    )))
                }
            }
        }
        Ok(ElementValue::Sequence(items))
    }

    fn skip_fragments(&mut self) -> Result<ElementValue, CodecError> {
        let mut fragments: usize = 0;
        loop {
            let Some(tag) = self.read_tag()? else {
                return Err(CodecError::Malformed("pixel fragments truncated".to_string()));
            };
            let length = self.read_u32()?;
            match tag {
                ITEM => {
                    self.skip(length)?;
                    fragments += 1;
                }
                SEQUENCE_DELIMITER => break,
                other => {
                    return Err(CodecError::Malformed(format!(
                        "unexpected {} among pixel fragments",
                        other
                    )))
                }
            }
        }
        // The first fragment is the offset table
        Ok(ElementValue::Encapsulated {
            fragments: fragments.saturating_sub(1),
        })
    }
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn trim_value(value: &str) -> String {
    value.trim_matches(|c: char| c == ' ' || c == '\0').to_string()
}

fn decode_value(vr: Vr, bytes: Vec<u8>) -> ElementValue {
    match &vr.0 {
        b"AE" | b"AS" | b"CS" | b"DA" | b"DS" | b"DT" | b"IS" | b"LO" | b"PN" | b"SH" | b"TM"
        | b"UC" | b"UI" => {
            let text = decode_text(&bytes);
            if text.trim_matches(|c: char| c == ' ' || c == '\0').is_empty() {
                return ElementValue::Strings(Vec::new());
            }
            ElementValue::Strings(text.split('\\').map(trim_value).collect())
        }
        b"LT" | b"ST" | b"UT" | b"UR" => {
            let text = decode_text(&bytes);
            let text = text.trim_end_matches(|c: char| c == ' ' || c == '\0');
            ElementValue::Strings(vec![text.to_string()])
        }
        b"US" => ElementValue::Ints(
            bytes
                .chunks_exact(2)
                .map(|c| i64::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
        ),
        b"SS" => ElementValue::Ints(
            bytes
                .chunks_exact(2)
                .map(|c| i64::from(i16::from_le_bytes([c[0], c[1]])))
                .collect(),
        ),
        b"UL" => ElementValue::Ints(
            bytes
                .chunks_exact(4)
                .map(|c| i64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
        ),
        b"SL" => ElementValue::Ints(
            bytes
                .chunks_exact(4)
                .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
        ),
        b"SV" | b"UV" => ElementValue::Ints(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(c);
                    i64::from_le_bytes(buf)
                })
                .collect(),
        ),
        b"FL" => ElementValue::Floats(
            bytes
                .chunks_exact(4)
                .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
        ),
        b"FD" => ElementValue::Floats(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(c);
                    f64::from_le_bytes(buf)
                })
                .collect(),
        ),
        b"AT" => ElementValue::Strings(
            bytes
                .chunks_exact(4)
                .map(|c| {
                    Tag::new(
                        u16::from_le_bytes([c[0], c[1]]),
                        u16::from_le_bytes([c[2], c[3]]),
                    )
                    .to_string()
                })
                .collect(),
        ),
        _ => ElementValue::Bytes(bytes),
    }
}
