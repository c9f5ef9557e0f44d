// DDJ texture containers
//
// A DDJ is a DDS file behind a 20-byte header: 12 signature bytes, u32 size
// of what follows the signature, u32 texture type. Stripping the header
// yields the DDS bytes unchanged.

use std::path::{Path, PathBuf};

use jmx_shared::error::read_file;
use jmx_shared::util::byte_cursor::SIGNATURE_LEN;
use jmx_shared::{ByteCursor, FormatError, Result, SeekOrigin};

pub const DDJ_HEADER_LEN: usize = 20;
const DDS_MAGIC: &[u8; 4] = b"DDS ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdjHeader {
    /// Byte count after the signature, including the two header words
    pub texture_size: u32,
    pub texture_type: u32,
}

impl DdjHeader {
    pub fn read_from(cursor: &mut ByteCursor) -> Result<DdjHeader> {
        cursor.skip(SIGNATURE_LEN)?;
        Ok(DdjHeader {
            texture_size: cursor.read_u32()?,
            texture_type: cursor.read_u32()?,
        })
    }

    /// Length of the embedded DDS payload
    pub fn payload_len(&self) -> Result<usize> {
        (self.texture_size as usize).checked_sub(8).ok_or_else(|| {
            FormatError::constraint(format!("ddj texture size {} is below 8", self.texture_size))
        })
    }
}

/// Drop the DDJ header and return the DDS bytes.
pub fn ddj_to_dds(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let mut cursor = ByteCursor::from_bytes(bytes);
    let header = DdjHeader::read_from(&mut cursor)?;
    let payload = header.payload_len()?;
    cursor.ensure(payload)?;
    if cursor.remaining() > payload {
        tracing::debug!("ddj: {} byte(s) past the declared payload dropped", cursor.remaining() - payload);
    }

    cursor.seek(0, SeekOrigin::Begin)?;
    cursor.splice_bytes(DDJ_HEADER_LEN)?;
    let mut dds = cursor.into_inner();
    dds.truncate(payload);

    if !dds.starts_with(DDS_MAGIC) {
        tracing::warn!("ddj payload (type {}) does not start with a DDS magic", header.texture_type);
    }
    Ok(dds)
}

/// Where `convert_file` writes the DDS for `input`
pub fn dds_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let renamed = input.with_extension("dds");
    match (output_dir, renamed.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => renamed,
    }
}

/// Convert one DDJ file. An existing output is kept unless `overwrite`.
pub fn convert_file(input: &Path, output_dir: Option<&Path>, overwrite: bool) -> Result<PathBuf> {
    let output = dds_path(input, output_dir);
    if output.exists() && !overwrite {
        tracing::debug!("{} exists, skipping", output.display());
        return Ok(output);
    }

    let bytes = read_file(input)?;
    let dds = ddj_to_dds(bytes).map_err(|e| e.with_path(input))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FormatError::io(parent, e))?;
    }
    std::fs::write(&output, &dds).map_err(|e| FormatError::io(&output, e))?;
    tracing::info!("{} -> {} ({} bytes)", input.display(), output.display(), dds.len());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ddj(payload: &[u8]) -> Vec<u8> {
        let mut bytes = b"JMXVDDJ 1000".to_vec();
        bytes.extend_from_slice(&(payload.len() as u32 + 8).to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_strip_header() {
        let payload = b"DDS \x7c\x00\x00\x00pixels";
        let input = ddj(payload);
        assert_eq!(input.len(), payload.len() + DDJ_HEADER_LEN);
        assert_eq!(ddj_to_dds(input).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_declared_size_too_large() {
        let mut input = ddj(b"DDS data");
        input.truncate(input.len() - 2);
        assert!(matches!(ddj_to_dds(input), Err(FormatError::TruncatedBuffer { .. })));
    }

    #[test]
    fn test_short_file() {
        assert!(matches!(
            ddj_to_dds(b"JMXVDDJ".to_vec()),
            Err(FormatError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_convert_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("oakk_dust_earth03.ddj");
        std::fs::write(&input, ddj(b"DDS body")).unwrap();

        let out_dir = dir.path().join("out");
        let output = convert_file(&input, Some(&out_dir), false).unwrap();
        assert_eq!(output, out_dir.join("oakk_dust_earth03.dds"));
        assert_eq!(std::fs::read(&output).unwrap(), b"DDS body");

        std::fs::write(&input, ddj(b"DDS newer")).unwrap();
        convert_file(&input, Some(&out_dir), false).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"DDS body");
        convert_file(&input, Some(&out_dir), true).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"DDS newer");
    }
}
