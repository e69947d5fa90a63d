//! Scanning firmware images for tagged elements.
//!
//! IMG3-style images are a header followed by a run of elements, each
//! starting with a 4-byte tag and two little-endian size fields. Elements
//! sit on 4-byte boundaries, so the scan walks the stream one 32-bit word
//! at a time and never re-examines bytes it has moved past.
//!
//! Tags compare as little-endian `u32` values: the `KBAG` element is stored
//! on disk as the bytes `GABK`. Reading the fields big-endian yields a
//! record that parses fine but carries the wrong key material.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{Cursor, ErrorKind, Read};

use crate::error::{Error, Result};

/// A 4-byte element tag, as a little-endian `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType(pub u32);

impl ElementType {
    pub const DATA: Self = Self(0x4441_5441);
    pub const TYPE: Self = Self(0x5459_5045);
    pub const KBAG: Self = Self(0x4B42_4147);
    pub const SHSH: Self = Self(0x5348_5348);
    pub const CERT: Self = Self(0x4345_5254);
    pub const CHIP: Self = Self(0x4348_4950);
    pub const PROD: Self = Self(0x5052_4F44);
    pub const SDOM: Self = Self(0x5344_4F4D);
    pub const BORD: Self = Self(0x424F_5244);
    pub const SEPO: Self = Self(0x5345_504F);
    pub const ECID: Self = Self(0x4543_4944);

    /// The four bytes as they appear in the image.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for ElementType {
    /// Human-readable tag name, e.g. `KBAG`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.0.to_be_bytes();
        if name.iter().all(|b| b.is_ascii_graphic()) {
            write!(f, "{}", String::from_utf8_lossy(&name))
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

/// Image container magic found at the very start of a firmware image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageContainer(pub u32);

impl ImageContainer {
    pub const NOR: Self = Self(0x696D_6733); // img3
    pub const IMG3: Self = Self(0x496D_6733); // Img3
    pub const X8900: Self = Self(0x3030_3938); // 8900
    pub const IMG2: Self = Self(0x494D_4732); // IMG2
}

/// Fixed header at the start of an IMG3 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub container: ImageContainer,
    pub full_size: u32,
    pub data_size: u32,
    pub shsh_offset: u32,
    pub image_type: ElementType,
}

impl ImageHeader {
    pub const SIZE: usize = 20;

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; ImageHeader::SIZE];
        let got = read_full(&mut reader, &mut buf)?;
        if got < Self::SIZE {
            return Err(Error::TruncatedRecord {
                offset: 0,
                expected: Self::SIZE,
                available: got,
            });
        }

        let mut cursor = Cursor::new(&buf[..]);
        Ok(Self {
            container: ImageContainer(cursor.read_u32::<LittleEndian>()?),
            full_size: cursor.read_u32::<LittleEndian>()?,
            data_size: cursor.read_u32::<LittleEndian>()?,
            shsh_offset: cursor.read_u32::<LittleEndian>()?,
            image_type: ElementType(cursor.read_u32::<LittleEndian>()?),
        })
    }
}

/// Common header carried by every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub signature: ElementType,
    pub full_size: u32,
    pub data_size: u32,
}

const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// A decoded key bag: element header, key state and type, then the IV and
/// the AES key that unwrap the image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub header: ElementHeader,
    pub state: u32,
    pub key_type: u32,
    pub iv: [u8; IV_LEN],
    pub key: [u8; KEY_LEN],
}

impl TagRecord {
    pub const IV_LEN: usize = IV_LEN;
    pub const KEY_LEN: usize = KEY_LEN;
    /// Signature, two size fields, state, type, IV, key.
    pub const SIZE: usize = 4 * 5 + IV_LEN + KEY_LEN;

    fn parse(bytes: &[u8; TagRecord::SIZE]) -> Result<Self> {
        let mut cursor = Cursor::new(&bytes[..]);
        let header = ElementHeader {
            signature: ElementType(cursor.read_u32::<LittleEndian>()?),
            full_size: cursor.read_u32::<LittleEndian>()?,
            data_size: cursor.read_u32::<LittleEndian>()?,
        };
        let state = cursor.read_u32::<LittleEndian>()?;
        let key_type = cursor.read_u32::<LittleEndian>()?;
        let mut iv = [0u8; IV_LEN];
        cursor.read_exact(&mut iv)?;
        let mut key = [0u8; KEY_LEN];
        cursor.read_exact(&mut key)?;

        Ok(Self {
            header,
            state,
            key_type,
            iv,
            key,
        })
    }

    /// Lowercase hex of IV followed by key, the form decryption tools expect.
    pub fn kbag_hex(&self) -> String {
        let mut out = hex::encode(self.iv);
        out.push_str(&hex::encode(self.key));
        out
    }
}

/// Walk `reader` in 4-byte steps until a word equals `signature`, then
/// decode the record that starts there.
pub fn find_tag<R: Read>(mut reader: R, signature: ElementType) -> Result<TagRecord> {
    let target = signature.to_bytes();
    let mut offset = 0u64;
    let mut record = [0u8; TagRecord::SIZE];

    loop {
        let (word, rest) = record.split_at_mut(4);
        if read_full(&mut reader, word)? < 4 {
            return Err(Error::TagNotFound { signature });
        }

        if *word == target {
            let got = read_full(&mut reader, rest)?;
            if got < rest.len() {
                return Err(Error::TruncatedRecord {
                    offset,
                    expected: TagRecord::SIZE,
                    available: 4 + got,
                });
            }
            return TagRecord::parse(&record);
        }

        offset += 4;
    }
}

/// Find the key bag in a firmware image.
pub fn find_kbag<R: Read>(reader: R) -> Result<TagRecord> {
    find_tag(reader, ElementType::KBAG)
}

/// Fill `buf` as far as the reader allows; returns how much was read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IV: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];

    fn key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = 0xA0 ^ i as u8;
        }
        key
    }

    fn kbag_element(iv: &[u8; 16], key: &[u8; 32]) -> Vec<u8> {
        let mut buf = b"GABK".to_vec();
        buf.extend_from_slice(&(TagRecord::SIZE as u32).to_le_bytes());
        buf.extend_from_slice(&56u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&256u32.to_le_bytes());
        buf.extend_from_slice(iv);
        buf.extend_from_slice(key);
        buf
    }

    #[test]
    fn kbag_tag_is_stored_reversed() {
        assert_eq!(&ElementType::KBAG.to_bytes(), b"GABK");
        assert_eq!(ElementType::KBAG.to_string(), "KBAG");
        assert_eq!(ElementType(0x0102_0304).to_string(), "0x01020304");
    }

    #[test]
    fn finds_record_after_junk() {
        let mut image = Vec::new();
        image.extend_from_slice(b"3gmI");
        image.extend_from_slice(&[0x11; 28]);
        image.extend_from_slice(&kbag_element(&IV, &key()));
        image.extend_from_slice(b"trailing bytes");

        let record = find_kbag(image.as_slice()).unwrap();
        assert_eq!(record.header.signature, ElementType::KBAG);
        assert_eq!(record.header.full_size, TagRecord::SIZE as u32);
        assert_eq!(record.header.data_size, 56);
        assert_eq!(record.state, 1);
        assert_eq!(record.key_type, 256);
        assert_eq!(record.iv, IV);
        assert_eq!(record.key, key());
    }

    #[test]
    fn kbag_hex_is_iv_then_key() {
        let record = find_kbag(kbag_element(&IV, &key()).as_slice()).unwrap();
        let hex = record.kbag_hex();
        assert_eq!(hex.len(), 96);
        assert!(hex.starts_with("2b7e151628aed2a6abf7158809cf4f3c"));
        assert!(hex.ends_with("bcbdbebf"));
    }

    #[test]
    fn missing_tag_is_not_found() {
        let image = [0x5Au8; 256];
        let err = find_kbag(&image[..]).unwrap_err();
        assert!(matches!(
            err,
            Error::TagNotFound {
                signature: ElementType::KBAG
            }
        ));
    }

    #[test]
    fn misaligned_tag_is_skipped() {
        let mut image = vec![0u8; 2];
        image.extend_from_slice(&kbag_element(&IV, &key()));
        image.extend_from_slice(&[0u8; 2]);
        assert!(matches!(
            find_kbag(image.as_slice()),
            Err(Error::TagNotFound { .. })
        ));
    }

    #[test]
    fn signature_at_end_is_truncated() {
        let mut image = vec![0u8; 8];
        image.extend_from_slice(b"GABK");
        let err = find_kbag(image.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedRecord {
                offset: 8,
                expected: TagRecord::SIZE,
                available: 4
            }
        ));
    }

    #[test]
    fn partial_record_is_truncated() {
        let element = kbag_element(&IV, &key());
        let err = find_kbag(&element[..40]).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedRecord { available: 40, .. }
        ));
    }

    #[test]
    fn finds_other_element_types() {
        let mut image = b"EPYT".to_vec();
        image.extend_from_slice(&[0u8; TagRecord::SIZE - 4]);
        let record = find_tag(image.as_slice(), ElementType::TYPE).unwrap();
        assert_eq!(record.header.signature, ElementType::TYPE);
    }

    #[test]
    fn reads_image_header() {
        let mut image = b"3gmI".to_vec();
        image.extend_from_slice(&0x1000u32.to_le_bytes());
        image.extend_from_slice(&0x0F00u32.to_le_bytes());
        image.extend_from_slice(&0x0E00u32.to_le_bytes());
        image.extend_from_slice(b"tobi");

        let header = ImageHeader::read(image.as_slice()).unwrap();
        assert_eq!(header.container, ImageContainer::IMG3);
        assert_eq!(header.full_size, 0x1000);
        assert_eq!(header.data_size, 0x0F00);
        assert_eq!(header.shsh_offset, 0x0E00);
        assert_eq!(header.image_type.to_string(), "ibot");

        assert!(matches!(
            ImageHeader::read(&image[..12]),
            Err(Error::TruncatedRecord { available: 12, .. })
        ));
    }
}
