//! Bulk import of idioms from JSON.

use crate::accessor::DataAccessor;
use crate::models::{Idiom, ImplId, StorageKey};
use crate::observability::RequestContext;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of an import.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Keys of newly created idioms.
    pub created: Vec<StorageKey>,
    /// Keys of updated idioms.
    pub updated: Vec<StorageKey>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Many(Vec<Idiom>),
    One(Box<Idiom>),
}

/// Reads idioms from a JSON file holding one idiom or an array of idioms.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid idiom JSON.
pub fn read_idioms(path: &Path) -> Result<Vec<Idiom>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::upstream("fs", "read_import_file", e))?;
    let parsed: ImportFile = serde_json::from_str(&contents)
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))?;
    Ok(match parsed {
        ImportFile::Many(idioms) => idioms,
        ImportFile::One(idiom) => vec![*idiom],
    })
}

/// Saves each idiom, creating or updating it.
///
/// Idioms with id 0 get the next free idiom id, implementations with id 0 the
/// next free implementation ids. An idiom whose id already exists is saved
/// as an update of the stored version.
///
/// # Errors
///
/// Stops at the first failing save; earlier idioms stay imported.
pub fn import_idioms<A: DataAccessor + ?Sized>(
    accessor: &A,
    ctx: &RequestContext,
    idioms: Vec<Idiom>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for mut idiom in idioms {
        if idiom.id.get() == 0 {
            idiom.id = accessor.next_idiom_id(ctx)?;
        }
        assign_impl_ids(accessor, ctx, &mut idiom)?;

        match accessor.get_idiom(ctx, idiom.id) {
            Ok((key, stored)) => {
                idiom.version = stored.version;
                idiom.creation_date = stored.creation_date;
                accessor.save_existing_idiom(ctx, &key, &mut idiom)?;
                summary.updated.push(key);
            },
            Err(e) if e.is_not_found() => {
                let key = accessor.save_new_idiom(ctx, &mut idiom)?;
                summary.created.push(key);
            },
            Err(e) => return Err(e),
        }
    }
    tracing::info!(
        created = summary.created.len(),
        updated = summary.updated.len(),
        "Imported idioms"
    );
    Ok(summary)
}

fn assign_impl_ids<A: DataAccessor + ?Sized>(
    accessor: &A,
    ctx: &RequestContext,
    idiom: &mut Idiom,
) -> Result<()> {
    if idiom.implementations.iter().all(|i| i.id.get() != 0) {
        return Ok(());
    }
    let stored_next = accessor.next_impl_id(ctx)?.get();
    let own_next = idiom.max_impl_id().map_or(0, |max| max.get() + 1);
    let mut next = stored_next.max(own_next).max(1);
    for implementation in &mut idiom.implementations {
        if implementation.id.get() == 0 {
            implementation.id = ImplId::new(next);
            next += 1;
        }
    }
    Ok(())
}
