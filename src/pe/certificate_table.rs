//! The attribute certificate table (§4.D): data directory index 4, the one
//! directory addressed by file offset rather than RVA. Each entry is a
//! length-prefixed, 8-byte-aligned `WIN_CERTIFICATE` record.
//!
//! References:
//! <https://learn.microsoft.com/en-us/windows/win32/debug/pe-format#the-attribute-certificate-table-image-only>
//! <https://learn.microsoft.com/en-us/windows/win32/api/wintrust/ns-wintrust-win_certificate>

use crate::error::{Error, Result};
use crate::pe::cursor;
use alloc::format;
use alloc::vec::Vec;
use log::debug;

/// Size of the fixed `{length, revision, certificate_type}` header that
/// precedes every certificate's payload.
pub const CERTIFICATE_HEADER_SIZE: usize = 8;

/// `WIN_CERT_REVISION_1_0`
pub const REVISION_1_0: u16 = 0x0100;
/// `WIN_CERT_REVISION_2_0`
pub const REVISION_2_0: u16 = 0x0200;

/// `WIN_CERT_TYPE_X509`
pub const TYPE_X509: u16 = 0x0001;
/// `WIN_CERT_TYPE_PKCS_SIGNED_DATA`
pub const TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;
/// `WIN_CERT_TYPE_RESERVED_1`
pub const TYPE_RESERVED_1: u16 = 0x0003;
/// `WIN_CERT_TYPE_TS_STACK_SIGNED`
pub const TYPE_TS_STACK_SIGNED: u16 = 0x0004;

fn align_up8(n: usize) -> usize {
    (n + 7) & !7
}

/// One entry of the attribute certificate table. `revision` and
/// `certificate_type` are kept as raw values: interpreting or validating
/// the certificate payload itself is out of scope (spec Non-goals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub revision: u16,
    pub certificate_type: u16,
    pub certificate: Vec<u8>,
}

impl Certificate {
    /// The on-disk `dwLength` value: header size plus the unpadded payload.
    pub fn length(&self) -> u32 {
        (CERTIFICATE_HEADER_SIZE + self.certificate.len()) as u32
    }
}

/// The attribute certificate table: certificates are stored back-to-back on
/// disk starting at `file_offset`, each padded to the next 8-byte boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateTable {
    pub file_offset: u32,
    pub certificates: Vec<Certificate>,
}

impl CertificateTable {
    /// Walks the table starting at `file_offset` for exactly `table_size`
    /// bytes (the certificate-directory's size), failing on overflow, a
    /// `length < 8`, or a run past either the directory size or file end.
    pub fn parse(buf: &[u8], file_offset: u32, table_size: u32) -> Result<Self> {
        let start = file_offset as usize;
        let end = start.checked_add(table_size as usize).ok_or_else(|| {
            Error::MalformedCertificate("certificate table end offset overflows".into())
        })?;
        if end > buf.len() {
            return Err(Error::MalformedCertificate(format!(
                "certificate table end {end:#x} runs past end of file {:#x}",
                buf.len()
            )));
        }
        debug!("walking certificate table at {start:#x}, {table_size:#x} bytes");

        let mut offset = start;
        let mut certificates = Vec::new();
        while offset < end {
            debug!("reading certificate header at {offset:#x}");
            if end - offset < CERTIFICATE_HEADER_SIZE {
                return Err(Error::MalformedCertificate(
                    "truncated certificate header".into(),
                ));
            }
            let length = cursor::read_u32(buf, offset)?;
            if (length as usize) < CERTIFICATE_HEADER_SIZE {
                return Err(Error::MalformedCertificate(format!(
                    "certificate length {length} smaller than the 8-byte header"
                )));
            }
            let revision = cursor::read_u16(buf, offset + 4)?;
            let certificate_type = cursor::read_u16(buf, offset + 6)?;

            let payload_len = length as usize - CERTIFICATE_HEADER_SIZE;
            let payload_start = offset + CERTIFICATE_HEADER_SIZE;
            let payload_end = payload_start.checked_add(payload_len).ok_or_else(|| {
                Error::MalformedCertificate("certificate payload length overflows".into())
            })?;
            if payload_end > end {
                return Err(Error::MalformedCertificate(
                    "certificate entry runs past the directory's size".into(),
                ));
            }

            let certificate = cursor::read_bytes(buf, payload_start, payload_len)?.to_vec();
            debug!(
                "parsed certificate revision={revision:#x} type={certificate_type:#x} \
                 payload={payload_len:#x} bytes"
            );
            certificates.push(Certificate {
                revision,
                certificate_type,
                certificate,
            });

            offset = offset.checked_add(align_up8(length as usize)).ok_or_else(|| {
                Error::MalformedCertificate("certificate table offset overflows".into())
            })?;
        }

        Ok(CertificateTable {
            file_offset,
            certificates,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Total bytes the table occupies on disk, including inter-entry padding.
    pub fn size(&self) -> usize {
        self.certificates
            .iter()
            .map(|c| align_up8(c.length() as usize))
            .sum()
    }

    /// Sum of each entry's unpadded `length` -- the value that lands in the
    /// certificate-table data directory's `size` field (§4.F).
    pub fn total_length(&self) -> u32 {
        self.certificates.iter().map(Certificate::length).sum()
    }

    /// Writes every entry back-to-back with 8-byte alignment padding between
    /// them. The caller is expected to have zeroed `buf` already, so the
    /// padding bytes need no explicit write.
    pub fn write_into(&self, buf: &mut [u8]) -> Result<()> {
        let mut offset = self.file_offset as usize;
        for cert in &self.certificates {
            let length = cert.length();
            let padded = align_up8(length as usize);
            debug!(
                "writing certificate at {offset:#x}, length={length:#x}, padded to {padded:#x}"
            );
            cursor::write_u32(buf, offset, length)?;
            cursor::write_u16(buf, offset + 4, cert.revision)?;
            cursor::write_u16(buf, offset + 6, cert.certificate_type)?;
            cursor::write_bytes(buf, offset + CERTIFICATE_HEADER_SIZE, &cert.certificate)?;
            offset += padded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn entry(payload: &[u8]) -> Vec<u8> {
        let length = (CERTIFICATE_HEADER_SIZE + payload.len()) as u32;
        let mut buf = length.to_le_bytes().to_vec();
        buf.extend_from_slice(&REVISION_2_0.to_le_bytes());
        buf.extend_from_slice(&TYPE_PKCS_SIGNED_DATA.to_le_bytes());
        buf.extend_from_slice(payload);
        let padded = align_up8(buf.len());
        buf.resize(padded, 0);
        buf
    }

    #[test]
    fn parses_two_padded_entries() {
        let mut buf = vec![0u8; 16];
        let first = entry(&[0xaa; 0xf8]);
        let second = entry(&[0xbb; 0x40]);
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        let table = CertificateTable::parse(&buf, 16, (first.len() + second.len()) as u32).unwrap();
        assert_eq!(table.certificates.len(), 2);
        assert_eq!(table.certificates[0].certificate.len(), 0xf8);
        assert_eq!(table.certificates[1].certificate.len(), 0x40);
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let mut buf = vec![0u8; 8];
        let cert = entry(&[1, 2, 3, 4, 5]);
        buf.extend_from_slice(&cert);

        let table = CertificateTable::parse(&buf, 8, cert.len() as u32).unwrap();
        let mut out = vec![0u8; buf.len()];
        table.write_into(&mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn rejects_length_under_header_size() {
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&4u32.to_le_bytes());
        assert!(CertificateTable::parse(&buf, 0, 8).is_err());
    }

    #[test]
    fn rejects_entry_past_directory_size() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&16u32.to_le_bytes());
        assert!(CertificateTable::parse(&buf, 0, 8).is_err());
    }
}
