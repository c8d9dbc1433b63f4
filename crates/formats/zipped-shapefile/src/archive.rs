//! Locating the members of a shapefile inside a zip archive.

use std::io::{Cursor, Read};

use datafusion_shared::{SpatialFormatReadError, SpatialFormatResult};
use log::debug;
use zip::ZipArchive;

/// Raw contents of the files that make up one shapefile.
#[derive(Debug, Clone, Default)]
pub struct ShapefileParts {
    /// Name of the `.shp` entry inside the archive
    pub name: String,
    pub shp: Vec<u8>,
    pub dbf: Option<Vec<u8>>,
    pub prj: Option<String>,
}

/// Extract the `.shp`, `.dbf` and `.prj` members of the first shapefile in the archive.
///
/// Sidecar files sharing the `.shp` stem are preferred; otherwise the first entry with
/// the right extension is used. macOS resource fork entries are ignored.
pub fn extract_parts(bytes: &[u8], context: &str) -> SpatialFormatResult<ShapefileParts> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| SpatialFormatReadError::Parse {
            message: format!("Invalid zip archive: {err}"),
            position: None,
            context: Some(context.to_string()),
        })?;

    let names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.starts_with("__MACOSX") && !name.ends_with('/'))
        .map(str::to_string)
        .collect();

    let shp_name = names
        .iter()
        .find(|name| has_extension(name, "shp"))
        .cloned()
        .ok_or_else(|| SpatialFormatReadError::Structure {
            message: "zip archive does not contain a .shp file".to_string(),
            context: Some(context.to_string()),
        })?;
    let stem = &shp_name[..shp_name.len() - ".shp".len()];

    let sidecar = |extension: &str| {
        names
            .iter()
            .find(|name| {
                has_extension(name, extension)
                    && name[..name.len() - extension.len() - 1].eq_ignore_ascii_case(stem)
            })
            .or_else(|| names.iter().find(|name| has_extension(name, extension)))
            .cloned()
    };
    let dbf_name = sidecar("dbf");
    let prj_name = sidecar("prj");
    debug!("Reading shapefile {shp_name} (dbf: {dbf_name:?}, prj: {prj_name:?}) from {context}");

    let shp = read_entry(&mut archive, &shp_name, context)?;
    let dbf = dbf_name
        .map(|name| read_entry(&mut archive, &name, context))
        .transpose()?;
    let prj = prj_name
        .map(|name| read_entry(&mut archive, &name, context))
        .transpose()?
        .map(|raw| String::from_utf8_lossy(&raw).into_owned());

    Ok(ShapefileParts {
        name: shp_name,
        shp,
        dbf,
        prj,
    })
}

fn has_extension(name: &str, extension: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
    context: &str,
) -> SpatialFormatResult<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|err| SpatialFormatReadError::Parse {
            message: format!("Cannot open {name}: {err}"),
            position: None,
            context: Some(context.to_string()),
        })?;
    let mut buffer = Vec::new();
    entry
        .read_to_end(&mut buffer)
        .map_err(|source| SpatialFormatReadError::Io {
            source,
            context: Some(format!("{context}: {name}")),
        })?;
    Ok(buffer)
}
