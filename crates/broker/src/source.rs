use crate::archive::ArchiveMount;
use crate::error::{ArchiveError, TokenizeError};
use crate::path::SourcePath;

/// Read the text of a source unit from disk or from an archive member
pub fn read_source(path: &SourcePath) -> Result<String, TokenizeError> {
    if path.is_archive() {
        let Some((archive, member)) = path.split_archive() else {
            return Err(TokenizeError::Read {
                path: path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "archive bundle does not exist",
                ),
            });
        };
        if member.is_empty() {
            return Err(ArchiveError::MemberNotFound {
                path: archive,
                member,
            }
            .into());
        }
        let mut mount = ArchiveMount::open(&archive)?;
        return Ok(mount.read_to_string(&member)?);
    }

    let bytes = std::fs::read(path.as_str()).map_err(|source| TokenizeError::Read {
        path: path.clone(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
