//! Codec for the LAS Extra Bytes VLR (user id `LASF_Spec`, record id 4).
//!
//! Each descriptor is 192 bytes:
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 2    | reserved     |
//! | 2      | 1    | data type    |
//! | 3      | 1    | options      |
//! | 4      | 32   | name         |
//! | 36     | 4    | unused       |
//! | 40     | 120  | no data, min, max, scale, offset |
//! | 160    | 32   | description  |
//!
//! Fields are laid out in each point record in descriptor order.

use las::Vlr;

use crate::{channels::ChannelType, AugmentError};

pub const EXTRA_BYTES_USER_ID: &str = "LASF_Spec";
pub const EXTRA_BYTES_RECORD_ID: u16 = 4;

const DESCRIPTOR_LEN: usize = 192;
const NAME_OFFSET: usize = 4;
const DESCRIPTION_OFFSET: usize = 160;
pub const NAME_LEN: usize = 32;

fn base_size(data_type: u8) -> Option<usize> {
    match data_type {
        1 | 2 => Some(1),
        3 | 4 => Some(2),
        5 | 6 | 9 => Some(4),
        7 | 8 | 10 => Some(8),
        _ => None,
    }
}

fn read_fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_fixed_str(dst: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(dst.len());
    dst[..len].copy_from_slice(&bytes[..len]);
}

pub fn is_extra_bytes_vlr(vlr: &Vlr) -> bool {
    vlr.user_id == EXTRA_BYTES_USER_ID && vlr.record_id == EXTRA_BYTES_RECORD_ID
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraBytesDescriptor {
    raw: [u8; DESCRIPTOR_LEN],
}

impl ExtraBytesDescriptor {
    pub fn new(name: &str, channel_type: ChannelType, description: &str) -> Self {
        Self::with_data_type(name, channel_type.data_type(), description)
    }

    /// Descriptor for any LAS extra bytes data type id.
    pub fn with_data_type(name: &str, data_type: u8, description: &str) -> Self {
        let mut raw = [0u8; DESCRIPTOR_LEN];
        raw[2] = data_type;
        write_fixed_str(&mut raw[NAME_OFFSET..NAME_OFFSET + NAME_LEN], name);
        write_fixed_str(
            &mut raw[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + NAME_LEN],
            description,
        );
        Self { raw }
    }

    /// Descriptor covering `size` opaque bytes (data type 0).
    pub fn undocumented(size: u8) -> Self {
        let mut raw = [0u8; DESCRIPTOR_LEN];
        raw[3] = size;
        Self { raw }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; DESCRIPTOR_LEN];
        raw.copy_from_slice(bytes);
        Self { raw }
    }

    pub fn data_type(&self) -> u8 {
        self.raw[2]
    }

    pub fn options(&self) -> u8 {
        self.raw[3]
    }

    pub fn name(&self) -> String {
        read_fixed_str(&self.raw[NAME_OFFSET..NAME_OFFSET + NAME_LEN])
    }

    pub fn description(&self) -> String {
        read_fixed_str(&self.raw[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + NAME_LEN])
    }

    /// Number of bytes the field occupies in every point record.
    pub fn size(&self) -> Result<usize, AugmentError> {
        let data_type = self.data_type();
        let size = match data_type {
            0 => Some(self.options() as usize),
            1..=10 => base_size(data_type),
            // deprecated two- and three-element array types
            11..=20 => base_size(data_type - 10).map(|s| s * 2),
            21..=30 => base_size(data_type - 20).map(|s| s * 3),
            _ => None,
        };
        size.ok_or_else(|| {
            AugmentError::MalformedExtraBytes(format!(
                "field '{}' has unknown data type {}",
                self.name(),
                data_type
            ))
        })
    }
}

/// Ordered extra bytes fields of a point format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraBytesLayout {
    descriptors: Vec<ExtraBytesDescriptor>,
}

impl ExtraBytesLayout {
    pub fn parse(data: &[u8]) -> Result<Self, AugmentError> {
        if data.len() % DESCRIPTOR_LEN != 0 {
            return Err(AugmentError::MalformedExtraBytes(format!(
                "record length {} is not a multiple of {}",
                data.len(),
                DESCRIPTOR_LEN
            )));
        }
        let descriptors = data
            .chunks_exact(DESCRIPTOR_LEN)
            .map(ExtraBytesDescriptor::from_bytes)
            .collect();
        Ok(Self { descriptors })
    }

    /// Reads the layout from the first Extra Bytes record among `vlrs`.
    pub fn from_vlrs<'a>(vlrs: impl IntoIterator<Item = &'a Vlr>) -> Result<Self, AugmentError> {
        match vlrs.into_iter().find(|vlr| is_extra_bytes_vlr(vlr)) {
            Some(vlr) => Self::parse(&vlr.data),
            None => Ok(Self::default()),
        }
    }

    pub fn descriptors(&self) -> &[ExtraBytesDescriptor] {
        &self.descriptors
    }

    /// Total bytes per point described by this layout.
    pub fn record_len(&self) -> Result<usize, AugmentError> {
        self.descriptors.iter().map(|d| d.size()).sum()
    }

    /// Byte offset and descriptor of the field named `name`.
    pub fn find(&self, name: &str) -> Result<Option<(usize, &ExtraBytesDescriptor)>, AugmentError> {
        let mut offset = 0;
        for descriptor in &self.descriptors {
            if descriptor.data_type() != 0 && descriptor.name() == name {
                return Ok(Some((offset, descriptor)));
            }
            offset += descriptor.size()?;
        }
        Ok(None)
    }

    /// Appends a field and returns its byte offset.
    pub fn push(&mut self, descriptor: ExtraBytesDescriptor) -> Result<usize, AugmentError> {
        let offset = self.record_len()?;
        self.descriptors.push(descriptor);
        Ok(offset)
    }

    /// Covers `len` trailing bytes that no descriptor describes, so fields
    /// appended afterwards land at the offsets readers compute.
    pub fn pad_to(&mut self, len: usize) -> Result<(), AugmentError> {
        let mut described = self.record_len()?;
        if described > len {
            return Err(AugmentError::MalformedExtraBytes(format!(
                "descriptors cover {} bytes but points carry {}",
                described, len
            )));
        }
        while described < len {
            let chunk = (len - described).min(u8::MAX as usize);
            self.descriptors
                .push(ExtraBytesDescriptor::undocumented(chunk as u8));
            described += chunk;
        }
        Ok(())
    }

    pub fn to_vlr(&self) -> Vlr {
        let mut data = Vec::with_capacity(self.descriptors.len() * DESCRIPTOR_LEN);
        for descriptor in &self.descriptors {
            data.extend_from_slice(&descriptor.raw);
        }
        Vlr {
            user_id: EXTRA_BYTES_USER_ID.to_string(),
            record_id: EXTRA_BYTES_RECORD_ID,
            description: "Extra Bytes Record".to_string(),
            data,
        }
    }
}
