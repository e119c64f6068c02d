//! TMD (Title Metadata) - signed manifest of an installed title's contents.
//!
//! Found as `tmd` files next to the content of every installed title (and
//! inside CIA archives). Describes the title's version and, for each
//! content, its ID, index, type flags, size and SHA-256 hash. The content
//! index also seeds the AES-CTR counter used to decrypt that content.
//!
//! ## File Layout
//! ```text
//! [0x000] SignatureType                                 (u32 BE)
//! [0x004] Signature                                     (0x200 / 0x100 / 0x3C bytes)
//! [....]  Padding up to the next 0x40 boundary
//! [body]  Body                                          (0x9C4 bytes)
//! [body + 0x9C4] ContentChunk records                   (ContentCount × 0x30 bytes)
//! ```
//!
//! ## Signature types
//! | Value     | Algorithm        | Signature size |
//! |-----------|------------------|----------------|
//! | `0x10000` | RSA-4096 SHA-1   | 0x200 |
//! | `0x10001` | RSA-2048 SHA-1   | 0x100 |
//! | `0x10002` | ECDSA SHA-1      | 0x3C  |
//! | `0x10003` | RSA-4096 SHA-256 | 0x200 |
//! | `0x10004` | RSA-2048 SHA-256 | 0x100 |
//! | `0x10005` | ECDSA SHA-256    | 0x3C  |
//!
//! ## Body (0x9C4 bytes)
//! ```text
//! [0x000] Issuer (null-padded)                          (0x40 bytes)
//! [0x040] Version                                       (u8)
//! [0x041] CaCrlVersion                                  (u8)
//! [0x042] SignerCrlVersion                              (u8)
//! [0x043] Reserved                                      (u8)
//! [0x044] SystemVersion                                 (u64 BE)
//! [0x04C] TitleId                                       (u64 BE)
//! [0x054] TitleType                                     (u32 BE)
//! [0x058] GroupId                                       (u16 BE)
//! [0x05A] SaveDataSize                                  (u32 BE)
//! [0x05E] SrlPrivateSaveDataSize                        (u32 BE)
//! [0x062] Reserved                                      (4 bytes)
//! [0x066] SrlFlag                                       (u8)
//! [0x067] Reserved                                      (0x31 bytes)
//! [0x098] AccessRights                                  (u32 BE)
//! [0x09C] TitleVersion                                  (u16 BE)
//! [0x09E] ContentCount                                  (u16 BE)
//! [0x0A0] BootContent                                   (u16 BE)
//! [0x0A2] Reserved                                      (2 bytes)
//! [0x0A4] ContentInfoRecords hash (SHA-256)             (0x20 bytes)
//! [0x0C4] ContentInfoRecords                            (64 × 0x24 bytes)
//! ```
//!
//! ## ContentInfo (0x24 bytes)
//! ```text
//! [0x00] ContentIndexOffset                            (u16 BE)
//! [0x02] ContentCommandCount                           (u16 BE)
//! [0x04] Hash of the covered ContentChunk records       (0x20 bytes)
//! ```
//!
//! ## ContentChunk (0x30 bytes)
//! ```text
//! [0x00] ContentId                                     (u32 BE)
//! [0x04] ContentIndex                                  (u16 BE)
//! [0x06] ContentType flags                             (u16 BE)
//! [0x08] ContentSize                                   (u64 BE)
//! [0x10] SHA-256 hash of the decrypted content          (0x20 bytes)
//! ```

use std::io::Cursor;

use crate::crypto::{Counter, content_counter};
use crate::utils::{align_up, be_u16, be_u32, be_u64, bytesa, bytesv, u8};
use crate::{Error, Result};

/// Size of the fixed TMD body.
pub const BODY_SIZE: usize = 0x9C4;
/// Size of one content info record.
pub const CONTENT_INFO_SIZE: usize = 0x24;
/// Size of one content chunk record.
pub const CONTENT_CHUNK_SIZE: usize = 0x30;
/// Number of content info records in the body, and the content count limit.
pub const MAX_CONTENTS: usize = 64;

/// Signature algorithms a TMD may be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SignatureType {
    Rsa4096Sha1 = 0x10000,
    Rsa2048Sha1 = 0x10001,
    EllipticSha1 = 0x10002,
    Rsa4096Sha256 = 0x10003,
    Rsa2048Sha256 = 0x10004,
    EcdsaSha256 = 0x10005,
}

impl SignatureType {
    /// Length of the signature blob in bytes.
    pub fn signature_size(self) -> usize {
        match self {
            Self::Rsa4096Sha1 | Self::Rsa4096Sha256 => 0x200,
            Self::Rsa2048Sha1 | Self::Rsa2048Sha256 => 0x100,
            Self::EllipticSha1 | Self::EcdsaSha256 => 0x3C,
        }
    }
}

impl TryFrom<u32> for SignatureType {
    type Error = Error;
    fn try_from(v: u32) -> Result<Self> {
        match v {
            0x10000 => Ok(Self::Rsa4096Sha1),
            0x10001 => Ok(Self::Rsa2048Sha1),
            0x10002 => Ok(Self::EllipticSha1),
            0x10003 => Ok(Self::Rsa4096Sha256),
            0x10004 => Ok(Self::Rsa2048Sha256),
            0x10005 => Ok(Self::EcdsaSha256),
            _ => Err(Error::UnsupportedSignature(v)),
        }
    }
}

/// Well-known positions in the content chunk list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContentIndex {
    /// The executable (boot) content.
    Main = 0,
    /// Electronic manual.
    Manual = 1,
    /// Download Play child container.
    Dlp = 2,
}

/// Content type bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentType(pub u16);

impl ContentType {
    pub const ENCRYPTED: u16 = 1 << 0;
    pub const DISC: u16 = 1 << 2;
    pub const CFM: u16 = 1 << 3;
    pub const OPTIONAL: u16 = 1 << 14;
    pub const SHARED: u16 = 1 << 15;

    pub fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn is_disc(self) -> bool {
        self.0 & Self::DISC != 0
    }

    pub fn is_cfm(self) -> bool {
        self.0 & Self::CFM != 0
    }

    pub fn is_optional(self) -> bool {
        self.0 & Self::OPTIONAL != 0
    }

    pub fn is_shared(self) -> bool {
        self.0 & Self::SHARED != 0
    }
}

/// One content info record from the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    /// First content chunk covered by this record.
    pub index: u16,
    /// Number of content chunks covered.
    pub command_count: u16,
    /// SHA-256 over the covered content chunk records.
    pub hash: [u8; 0x20],
}

/// One content chunk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    /// Content ID; also the content's file name (`%08x.app`).
    pub id: u32,
    /// Content index; seeds the decryption counter.
    pub index: u16,
    /// Type flags.
    pub content_type: ContentType,
    /// Size of the content in bytes.
    pub size: u64,
    /// SHA-256 of the decrypted content.
    pub hash: [u8; 0x20],
}

impl ContentChunk {
    /// Initial AES-CTR counter for this content.
    pub fn ctr(&self) -> Counter {
        content_counter(self.index)
    }
}

/// Parsed TMD fixed body.
#[derive(Debug, Clone)]
pub struct TmdBody {
    /// Issuer string (null-padded).
    pub issuer: [u8; 0x40],
    pub version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    /// Minimum system version required to run the title.
    pub system_version: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    pub savedata_size: u32,
    pub srl_private_savedata_size: u32,
    pub srl_flag: u8,
    pub access_rights: u32,
    pub title_version: u16,
    pub content_count: u16,
    pub boot_content: u16,
    /// SHA-256 over the content info records.
    pub content_info_hash: [u8; 0x20],
    pub content_info: Vec<ContentInfo>,
}

impl TmdBody {
    fn parse(r: &mut Cursor<&[u8]>) -> Result<Self> {
        let issuer = bytesa::<0x40>(r)?;
        let version = u8(r)?;
        let ca_crl_version = u8(r)?;
        let signer_crl_version = u8(r)?;
        let _reserved = u8(r)?;
        let system_version = be_u64(r)?;
        let title_id = be_u64(r)?;
        let title_type = be_u32(r)?;
        let group_id = be_u16(r)?;
        let savedata_size = be_u32(r)?;
        let srl_private_savedata_size = be_u32(r)?;
        let _reserved2 = bytesa::<4>(r)?;
        let srl_flag = u8(r)?;
        let _reserved3 = bytesa::<0x31>(r)?;
        let access_rights = be_u32(r)?;
        let title_version = be_u16(r)?;
        let content_count = be_u16(r)?;
        let boot_content = be_u16(r)?;
        let _reserved4 = bytesa::<2>(r)?;
        let content_info_hash = bytesa::<0x20>(r)?;

        let mut content_info = Vec::with_capacity(MAX_CONTENTS);
        for _ in 0..MAX_CONTENTS {
            content_info.push(ContentInfo {
                index: be_u16(r)?,
                command_count: be_u16(r)?,
                hash: bytesa::<0x20>(r)?,
            });
        }

        Ok(Self {
            issuer,
            version,
            ca_crl_version,
            signer_crl_version,
            system_version,
            title_id,
            title_type,
            group_id,
            savedata_size,
            srl_private_savedata_size,
            srl_flag,
            access_rights,
            title_version,
            content_count,
            boot_content,
            content_info_hash,
            content_info,
        })
    }
}

/// Parsed title metadata.
#[derive(Debug, Clone)]
pub struct TitleMetadata {
    signature_type: SignatureType,
    signature: Vec<u8>,
    body: TmdBody,
    chunks: Vec<ContentChunk>,
}

impl TitleMetadata {
    /// Parse a TMD that starts at `offset` within `data`.
    ///
    /// Every length is checked before it is read: a truncated buffer yields
    /// [`Error::UnexpectedEof`], an unknown signature type
    /// [`Error::UnsupportedSignature`], and a content count above 64
    /// [`Error::Parse`].
    pub fn load(data: &[u8], offset: usize) -> Result<Self> {
        let data = data.get(offset..).ok_or(Error::InvalidRange)?;
        if data.len() < 4 {
            return Err(Error::UnexpectedEof);
        }

        let mut r = Cursor::new(data);
        let raw_type = be_u32(&mut r)?;
        let signature_type = SignatureType::try_from(raw_type).inspect_err(|_| {
            tracing::error!(signature_type = raw_type, "TMD has an unknown signature type");
        })?;
        let signature_size = signature_type.signature_size();

        // The body starts at the next 0x40 boundary after the signature.
        let body_start = align_up(4 + signature_size, 0x40);
        let body_end = body_start + BODY_SIZE;
        if data.len() < body_end {
            return Err(Error::UnexpectedEof);
        }

        let signature = bytesv(&mut r, signature_size)?;
        r.set_position(body_start as u64);
        let body = TmdBody::parse(&mut r)?;

        let count = body.content_count as usize;
        if count > MAX_CONTENTS {
            return Err(Error::Parse("TMD content count exceeds 64"));
        }
        let expected = body_end + count * CONTENT_CHUNK_SIZE;
        if data.len() < expected {
            tracing::error!(
                expected,
                actual = data.len(),
                "TMD is too small for its content chunks"
            );
            return Err(Error::UnexpectedEof);
        }

        let mut chunks = Vec::with_capacity(count);
        for _ in 0..count {
            let id = be_u32(&mut r)?;
            let index = be_u16(&mut r)?;
            let content_type = ContentType(be_u16(&mut r)?);
            let size = be_u64(&mut r)?;
            let hash = bytesa::<0x20>(&mut r)?;
            chunks.push(ContentChunk {
                id,
                index,
                content_type,
                size,
                hash,
            });
        }

        Ok(Self {
            signature_type,
            signature,
            body,
            chunks,
        })
    }

    pub fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The full fixed body.
    pub fn body(&self) -> &TmdBody {
        &self.body
    }

    /// Issuer with the null padding stripped.
    pub fn issuer(&self) -> String {
        let raw = &self.body.issuer;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    pub fn title_id(&self) -> u64 {
        self.body.title_id
    }

    pub fn title_type(&self) -> u32 {
        self.body.title_type
    }

    pub fn title_version(&self) -> u16 {
        self.body.title_version
    }

    pub fn system_version(&self) -> u64 {
        self.body.system_version
    }

    pub fn content_count(&self) -> usize {
        self.chunks.len()
    }

    /// All content chunks in record order.
    pub fn chunks(&self) -> &[ContentChunk] {
        &self.chunks
    }

    /// The 64 content info records from the body.
    pub fn content_infos(&self) -> &[ContentInfo] {
        &self.body.content_info
    }

    /// Content chunk at `index`, or [`Error::IndexOutOfRange`].
    pub fn content_chunk(&self, index: usize) -> Result<&ContentChunk> {
        self.chunks.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.chunks.len(),
        })
    }

    pub fn boot_content_id(&self) -> Result<u32> {
        self.content_id_by_index(ContentIndex::Main as usize)
    }

    pub fn manual_content_id(&self) -> Result<u32> {
        self.content_id_by_index(ContentIndex::Manual as usize)
    }

    pub fn dlp_content_id(&self) -> Result<u32> {
        self.content_id_by_index(ContentIndex::Dlp as usize)
    }

    pub fn content_id_by_index(&self, index: usize) -> Result<u32> {
        Ok(self.content_chunk(index)?.id)
    }

    pub fn content_type_by_index(&self, index: usize) -> Result<ContentType> {
        Ok(self.content_chunk(index)?.content_type)
    }

    pub fn content_size_by_index(&self, index: usize) -> Result<u64> {
        Ok(self.content_chunk(index)?.size)
    }

    /// Initial AES-CTR counter of the content at `index`.
    pub fn content_ctr_by_index(&self, index: usize) -> Result<Counter> {
        Ok(self.content_chunk(index)?.ctr())
    }

    /// Log the title and its contents at debug level.
    pub fn log_summary(&self) {
        tracing::debug!(
            title_id = %format!("{:016X}", self.title_id()),
            version = self.title_version(),
            system_version = %format!("{:016X}", self.system_version()),
            contents = self.content_count(),
            "title metadata"
        );
        for chunk in &self.chunks {
            tracing::debug!(
                id = %format!("{:08x}", chunk.id),
                index = chunk.index,
                content_type = %format!("{:#06x}", chunk.content_type.0),
                size = chunk.size,
                "content"
            );
        }
    }
}
