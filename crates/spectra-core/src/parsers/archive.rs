//! Zipped archives are expanded in memory; every supported member parses
//! independently and the resulting series merge into one spectrum sorted
//! by x, with per-member provenance.

use super::{detect_format, parse_member};
use crate::domain::{
    FormatHint, IngestError, IngestResult, RawTable,
};
use crate::numerics::deterministic_argsort;
use crate::provenance::{ProvenanceStage, ProvenanceStep};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

pub fn parse_zip_archive(source_name: &str, bytes: &[u8]) -> IngestResult<RawTable> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|error| {
        IngestError::Malformed {
            format: "zip",
            source_name: source_name.to_string(),
            reason: error.to_string(),
        }
    })?;

    let mut tables: Vec<RawTable> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(|error| {
            IngestError::Malformed {
                format: "zip",
                source_name: source_name.to_string(),
                reason: format!("member {index}: {error}"),
            }
        })?;
        if member.is_dir() {
            continue;
        }

        let member_name = format!("{source_name}!{}", member.name());
        let mut member_bytes = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut member_bytes)
            .map_err(|error| IngestError::Malformed {
                format: "zip",
                source_name: member_name.clone(),
                reason: error.to_string(),
            })?;

        let format = detect_format(&member_bytes);
        if format == FormatHint::ZipArchive {
            warnings.push(format!("skipped nested archive member '{}'", member.name()));
            continue;
        }

        match parse_member(&member_name, &member_bytes, format) {
            Ok(table) => tables.push(table),
            Err(error) => {
                // A member that is not a spectrum does not sink the archive.
                warnings.push(format!("skipped member '{}': {error}", member.name()));
            }
        }
    }

    if tables.is_empty() {
        return Err(IngestError::EmptyArchive {
            source_name: source_name.to_string(),
        });
    }

    if tables.len() == 1 {
        let mut table = tables.remove(0);
        table.source_name = source_name.to_string();
        table.warnings.extend(warnings);
        return Ok(table);
    }

    merge_member_tables(source_name, tables, warnings)
}

fn merge_member_tables(
    source_name: &str,
    tables: Vec<RawTable>,
    mut warnings: Vec<String>,
) -> IngestResult<RawTable> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut header = BTreeMap::new();
    let mut dropped_rows = 0_usize;
    let mut parse_provenance = Vec::new();
    let mut aux_dropped = false;

    let member_count = tables.len();
    for table in tables {
        parse_provenance.push(
            ProvenanceStep::new(
                ProvenanceStage::Parse,
                format!(
                    "parsed archive member '{}' as {} ({} rows)",
                    table.source_name,
                    table.format,
                    table.x.len()
                ),
            )
            .with_dropped_rows(table.dropped_rows),
        );
        dropped_rows += table.dropped_rows;
        x.extend(table.x);
        y.extend(table.y);
        aux_dropped |= table.aux.is_some();
        warnings.extend(table.warnings);
        for (key, value) in table.header {
            header.entry(key).or_insert(value);
        }
    }
    if aux_dropped {
        warnings.push("auxiliary columns are not carried across merged archive members".to_string());
    }

    let order = deterministic_argsort(&x);
    let x: Vec<f64> = order.iter().map(|&index| x[index]).collect();
    let y: Vec<f64> = order.iter().map(|&index| y[index]).collect();

    parse_provenance.push(ProvenanceStep::new(
        ProvenanceStage::Parse,
        format!(
            "merged {member_count} archive members into one series sorted by x ({} rows)",
            x.len()
        ),
    ));

    Ok(RawTable {
        source_name: source_name.to_string(),
        format: FormatHint::ZipArchive,
        x,
        y,
        aux: None,
        header,
        dropped_rows,
        warnings,
        parse_provenance,
    })
}
