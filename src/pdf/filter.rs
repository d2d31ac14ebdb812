//! Stream filter implementation
//!
//! Decoding covers the general-purpose filters a document needs to read its
//! own structure and content streams. Image-only codecs (DCT, JPX, CCITT,
//! JBIG2) are recognized but left encoded; their data passes through the
//! object model untouched.

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use super::{Dictionary, Object};

/// PDF stream filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCII85Decode,
    ASCIIHexDecode,
    CCITTFaxDecode,
    Crypt,
    DCTDecode,
    FlateDecode,
    JBIG2Decode,
    JPXDecode,
    LZWDecode,
    RunLengthDecode,
}

/// Predictor parameters from `/DecodeParms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub columns: usize,
    pub colors: usize,
    pub bits_per_component: usize,
}

impl PredictorParams {
    /// Read predictor parameters, `None` when no prediction applies
    pub fn from_dict(params: &Dictionary) -> Option<Self> {
        let predictor = params.get_integer("Predictor").unwrap_or(1);
        if predictor <= 1 {
            return None;
        }
        Some(Self {
            predictor: predictor.clamp(0, 255) as u8,
            columns: params.get_integer("Columns").unwrap_or(1).max(1) as usize,
            colors: params.get_integer("Colors").unwrap_or(1).max(1) as usize,
            bits_per_component: params.get_integer("BitsPerComponent").unwrap_or(8).max(1) as usize,
        })
    }

    /// Bits in one pixel, failing on overflow
    fn bits_per_pixel(&self) -> PDFResult<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(|| self.oversized())
    }

    fn bytes_per_pixel(&self) -> PDFResult<usize> {
        let bits = self.bits_per_pixel()?;
        Ok((bits / 8 + usize::from(bits % 8 != 0)).max(1))
    }

    fn bytes_per_row(&self) -> PDFResult<usize> {
        let bits = self
            .columns
            .checked_mul(self.bits_per_pixel()?)
            .ok_or_else(|| self.oversized())?;
        Ok(bits / 8 + usize::from(bits % 8 != 0))
    }

    fn oversized(&self) -> PDFError {
        PDFError::malformed(format!(
            "Predictor row of {} columns x {} colors x {} bits is too large",
            self.columns, self.colors, self.bits_per_component
        ))
    }
}

impl Filter {
    /// Create filter from name, including the inline-image abbreviations
    pub fn from_name(name: &str) -> PDFResult<Self> {
        match name {
            "ASCII85Decode" | "A85" => Ok(Filter::ASCII85Decode),
            "ASCIIHexDecode" | "AHx" => Ok(Filter::ASCIIHexDecode),
            "CCITTFaxDecode" | "CCF" => Ok(Filter::CCITTFaxDecode),
            "Crypt" => Ok(Filter::Crypt),
            "DCTDecode" | "DCT" => Ok(Filter::DCTDecode),
            "FlateDecode" | "Fl" => Ok(Filter::FlateDecode),
            "JBIG2Decode" => Ok(Filter::JBIG2Decode),
            "JPXDecode" => Ok(Filter::JPXDecode),
            "LZWDecode" | "LZW" => Ok(Filter::LZWDecode),
            "RunLengthDecode" | "RL" => Ok(Filter::RunLengthDecode),
            _ => Err(PDFError::UnsupportedFilter(name.to_string())),
        }
    }

    /// Canonical filter name
    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::Crypt => "Crypt",
            Filter::DCTDecode => "DCTDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::JPXDecode => "JPXDecode",
            Filter::LZWDecode => "LZWDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
        }
    }

    /// Image codecs whose decoded form is a raster, not bytes the core reads
    pub fn is_image_codec(&self) -> bool {
        matches!(
            self,
            Filter::CCITTFaxDecode | Filter::DCTDecode | Filter::JBIG2Decode | Filter::JPXDecode
        )
    }

    /// Decode data using this filter
    pub fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> PDFResult<Vec<u8>> {
        trace!("Decoding {} bytes with {}", data.len(), self.name());
        let predictor = params.and_then(PredictorParams::from_dict);

        let decoded = match self {
            Filter::ASCII85Decode => decode_ascii85(data)?,
            Filter::ASCIIHexDecode => decode_ascii_hex(data)?,
            Filter::RunLengthDecode => decode_run_length(data)?,
            Filter::FlateDecode => decode_flate(data)?,
            Filter::LZWDecode => {
                let early_change = params
                    .and_then(|p| p.get_integer("EarlyChange"))
                    .unwrap_or(1)
                    != 0;
                decode_lzw(data, early_change)?
            }
            Filter::Crypt => {
                let name = params.and_then(|p| p.get_name("Name")).unwrap_or("Identity");
                if name != "Identity" {
                    return Err(PDFError::UnsupportedFilter(format!("Crypt/{}", name)));
                }
                return Ok(data.to_vec());
            }
            Filter::CCITTFaxDecode | Filter::DCTDecode | Filter::JBIG2Decode | Filter::JPXDecode => {
                return Err(PDFError::UnsupportedFilter(self.name().to_string()));
            }
        };

        match predictor {
            Some(params) if matches!(self, Filter::FlateDecode | Filter::LZWDecode) => {
                apply_predictor(&decoded, &params)
            }
            _ => Ok(decoded),
        }
    }

    /// Encode data using this filter
    pub fn encode(&self, data: &[u8]) -> PDFResult<Vec<u8>> {
        match self {
            Filter::FlateDecode => encode_flate(data),
            Filter::ASCIIHexDecode => Ok(encode_ascii_hex(data)),
            Filter::ASCII85Decode => Ok(encode_ascii85(data)),
            Filter::RunLengthDecode => Ok(encode_run_length(data)),
            Filter::LZWDecode => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .encode(data)
                .map_err(|e| PDFError::CompressionError(format!("LZW: {:?}", e))),
            _ => Err(PDFError::UnsupportedFilter(self.name().to_string())),
        }
    }
}

/// Read the filter chain of a stream dictionary, in application order
pub fn filter_chain(dict: &Dictionary) -> PDFResult<Vec<(Filter, Option<Dictionary>)>> {
    let names: Vec<&str> = match dict.get("Filter") {
        None | Some(Object::Null) => return Ok(Vec::new()),
        Some(Object::Name(name)) => vec![name.as_str()],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_name()
                    .ok_or_else(|| PDFError::malformed("Filter array entry is not a name"))
            })
            .collect::<PDFResult<_>>()?,
        Some(other) => {
            return Err(PDFError::malformed(format!(
                "Filter entry is a {}",
                other.type_name()
            )))
        }
    };

    let params: Vec<Option<Dictionary>> = match dict.get("DecodeParms") {
        Some(Object::Dictionary(p)) => vec![Some(p.clone())],
        Some(Object::Array(items)) => items.iter().map(|item| item.as_dict().cloned()).collect(),
        _ => Vec::new(),
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Ok((Filter::from_name(name)?, params.get(i).cloned().flatten())))
        .collect()
}

fn decode_flate(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 2);
    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        // Truncated streams are common; keep what inflated cleanly
        Err(e) if !output.is_empty() => {
            warn!("Flate stream ended early after {} bytes: {}", output.len(), e);
            Ok(output)
        }
        Err(e) => Err(PDFError::CompressionError(e.to_string())),
    }
}

fn encode_flate(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PDFError::CompressionError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PDFError::CompressionError(e.to_string()))
}

fn decode_lzw(data: &[u8], early_change: bool) -> PDFResult<Vec<u8>> {
    let mut decoder = if early_change {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| PDFError::CompressionError(format!("LZW: {:?}", e)))
}

fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 4 / 5);
    let mut value: u64 = 0;
    let mut count = 0;

    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        i += 1;
        match byte {
            b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
            b'~' => break,
            b'\n' | b'\r' | b'\t' | b' ' | b'\x0C' | b'\0' => continue,
            b'!'..=b'u' => {
                value = value * 85 + u64::from(byte - b'!');
                count += 1;
                if count == 5 {
                    if value > u64::from(u32::MAX) {
                        return Err(PDFError::malformed("ASCII85 group overflows"));
                    }
                    output.extend_from_slice(&(value as u32).to_be_bytes());
                    value = 0;
                    count = 0;
                }
            }
            _ => {
                return Err(PDFError::malformed(format!(
                    "Invalid ASCII85 character: 0x{:02X}",
                    byte
                )))
            }
        }
    }

    if count == 1 {
        return Err(PDFError::malformed("ASCII85 data ends with a single character"));
    }
    if count > 1 {
        for _ in count..5 {
            value = value * 85 + 84;
        }
        let bytes = (value.min(u64::from(u32::MAX)) as u32).to_be_bytes();
        output.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(output)
}

fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 5 / 4 + 2);
    let mut buffer = [0u8; 4];

    for chunk in data.chunks(4) {
        buffer.fill(0);
        buffer[..chunk.len()].copy_from_slice(chunk);
        let value = u32::from_be_bytes(buffer);

        if value == 0 && chunk.len() == 4 {
            output.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        let mut temp = value;
        for digit in digits.iter_mut().rev() {
            *digit = (temp % 85) as u8 + b'!';
            temp /= 85;
        }
        output.extend_from_slice(&digits[..chunk.len() + 1]);
    }

    output.extend_from_slice(b"~>");
    output
}

fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'A'..=b'F' => byte - b'A' + 10,
            b'a'..=b'f' => byte - b'a' + 10,
            b'>' => break,
            b'\n' | b'\r' | b'\t' | b' ' | b'\x0C' | b'\0' => continue,
            _ => {
                return Err(PDFError::malformed(format!(
                    "Invalid hex character: 0x{:02X}",
                    byte
                )))
            }
        };
        match high.take() {
            Some(h) => output.push(h << 4 | digit),
            None => high = Some(digit),
        }
    }

    // Odd digit count: the missing final digit is zero
    if let Some(h) = high {
        output.push(h << 4);
    }

    Ok(output)
}

fn encode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut output = hex::encode_upper(data).into_bytes();
    output.push(b'>');
    output
}

fn decode_run_length(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let literal = data
                    .get(i..i + count)
                    .ok_or_else(|| PDFError::malformed("RunLength literal runs past end of data"))?;
                output.extend_from_slice(literal);
                i += count;
            }
            _ => {
                let byte = *data
                    .get(i)
                    .ok_or_else(|| PDFError::malformed("RunLength repeat runs past end of data"))?;
                output.extend(std::iter::repeat(byte).take(257 - length as usize));
                i += 1;
            }
        }
    }

    Ok(output)
}

fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / 128 + 1);
    let mut i = 0;

    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 128 {
            run += 1;
        }

        if run >= 2 {
            output.push((257 - run) as u8);
            output.push(data[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < data.len() && i - start < 128 {
            if i + 1 < data.len() && data[i + 1] == data[i] {
                break;
            }
            i += 1;
        }
        if i == start {
            i += 1;
        }
        output.push((i - start - 1) as u8);
        output.extend_from_slice(&data[start..i]);
    }

    output.push(128);
    output
}

/// Undo TIFF or PNG prediction
pub fn apply_predictor(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let bpp = params.bytes_per_pixel()?;
    let row_len = params.bytes_per_row()?;
    if row_len > data.len() {
        return Err(PDFError::malformed(format!(
            "Predictor row of {} bytes exceeds the {} bytes of stream data",
            row_len,
            data.len()
        )));
    }

    match params.predictor {
        2 => {
            if params.bits_per_component != 8 {
                return Err(PDFError::UnsupportedFilter(format!(
                    "TIFF predictor with {} bits per component",
                    params.bits_per_component
                )));
            }
            let mut output = data.to_vec();
            for row in output.chunks_mut(row_len) {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            Ok(output)
        }
        10..=15 => {
            let mut output = Vec::with_capacity(data.len());
            let mut prev_row = vec![0u8; row_len];

            for encoded in data.chunks(row_len + 1) {
                let filter_type = encoded[0];
                let input = &encoded[1..];
                let mut row = vec![0u8; row_len];
                row[..input.len()].copy_from_slice(input);

                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up = prev_row[i];
                    let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    let prediction = match filter_type {
                        0 => 0,
                        1 => left,
                        2 => up,
                        3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                        4 => paeth(left, up, up_left),
                        other => {
                            return Err(PDFError::malformed(format!(
                                "Invalid PNG filter type {}",
                                other
                            )))
                        }
                    };
                    row[i] = row[i].wrapping_add(prediction);
                }

                output.extend_from_slice(&row[..input.len()]);
                prev_row = row;
            }
            Ok(output)
        }
        other => Err(PDFError::UnsupportedFilter(format!("Predictor {}", other))),
    }
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}
