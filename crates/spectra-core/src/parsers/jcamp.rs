//! JCAMP-DX structured spectroscopy text: `##LABEL=value` records with
//! `(X++(Y..Y))` or `(XY..XY)` tabular data in AFFN form.
//!
//! Declared scale factors are applied to raw sample values before use, and
//! the x traversal direction is inferred from the data lines themselves,
//! not from the format's nominal ascending convention.

use super::ascii::parse_numeric_token;
use crate::domain::{
    FormatHint, IngestError, IngestResult, MIN_SPECTRUM_ROWS, RawTable,
};
use crate::provenance::{ProvenanceStage, ProvenanceStep};
use std::collections::BTreeMap;

const FORMAT: &str = "jcamp-dx";

#[derive(Debug, Clone, Copy, PartialEq)]
enum TableKind {
    XyData,
    XyPoints,
}

pub fn parse_jcamp(source_name: &str, bytes: &[u8]) -> IngestResult<RawTable> {
    let text = String::from_utf8_lossy(bytes);

    let mut header = BTreeMap::new();
    let mut table_kind: Option<TableKind> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut dropped_rows = 0_usize;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if table_kind.is_some() {
                dropped_rows += 1;
            }
            continue;
        }
        if trimmed.starts_with("$$") {
            continue;
        }

        if let Some(record) = trimmed.strip_prefix("##") {
            let (label, value) = split_record(record);
            match label.as_str() {
                "XYDATA" => {
                    table_kind = Some(TableKind::XyData);
                    continue;
                }
                "XYPOINTS" | "PEAKTABLE" => {
                    table_kind = Some(TableKind::XyPoints);
                    continue;
                }
                "END" => break,
                _ => {
                    header.insert(label.to_lowercase(), value.to_string());
                    continue;
                }
            }
        }

        if table_kind.is_some() {
            data_lines.push(trimmed);
        }
    }

    let Some(kind) = table_kind else {
        return Err(malformed(source_name, "no ##XYDATA= or ##XYPOINTS= table"));
    };

    let x_factor = header_f64(&header, "xfactor").unwrap_or(1.0);
    let y_factor = header_f64(&header, "yfactor").unwrap_or(1.0);
    let declared_npoints = header_f64(&header, "npoints").map(|n| n as usize);

    let (raw_x, raw_y) = match kind {
        TableKind::XyData => parse_xydata_lines(
            source_name,
            &data_lines,
            &mut dropped_rows,
            raw_delta_x(&header, x_factor),
        )?,
        TableKind::XyPoints => parse_xypoints_lines(&data_lines, &mut dropped_rows),
    };

    let mut warnings = Vec::new();
    if let Some(expected) = declared_npoints
        && expected != raw_x.len()
    {
        warnings.push(format!(
            "##NPOINTS= declares {expected} samples but the table holds {}",
            raw_x.len()
        ));
    }

    let x: Vec<f64> = raw_x.iter().map(|value| value * x_factor).collect();
    let y: Vec<f64> = raw_y.iter().map(|value| value * y_factor).collect();

    if x.len() < MIN_SPECTRUM_ROWS {
        return Err(IngestError::InsufficientSamples {
            source_name: source_name.to_string(),
            rows: x.len(),
            minimum: MIN_SPECTRUM_ROWS,
        });
    }

    let mut parse_provenance = vec![
        ProvenanceStep::new(
            ProvenanceStage::Parse,
            format!("parsed jcamp-dx table ({} rows)", x.len()),
        )
        .with_dropped_rows(dropped_rows),
    ];
    if x_factor != 1.0 || y_factor != 1.0 {
        parse_provenance.push(
            ProvenanceStep::new(
                ProvenanceStage::Parse,
                "applied declared linear scale factors to raw samples",
            )
            .with_formula(format!("x = raw * {x_factor}; y = raw * {y_factor}")),
        );
    }

    Ok(RawTable {
        source_name: source_name.to_string(),
        format: FormatHint::Jcamp,
        x,
        y,
        aux: None,
        header,
        dropped_rows,
        warnings,
        parse_provenance,
    })
}

/// `(X++(Y..Y))`: each line starts with an unscaled x followed by a run of
/// y values stepping by the raw x increment. The increment is taken from
/// consecutive line starts when possible so the traversal direction comes
/// from the data; the declared grid is only a fallback for a single line.
fn parse_xydata_lines(
    source_name: &str,
    lines: &[&str],
    dropped_rows: &mut usize,
    declared_delta: Option<f64>,
) -> IngestResult<(Vec<f64>, Vec<f64>)> {
    let mut parsed: Vec<(f64, Vec<f64>)> = Vec::new();

    for line in lines {
        let Some(values) = parse_affn_line(source_name, line)? else {
            *dropped_rows += 1;
            continue;
        };
        if values.len() < 2 {
            *dropped_rows += 1;
            continue;
        }
        parsed.push((values[0], values[1..].to_vec()));
    }

    let mut x = Vec::new();
    let mut y = Vec::new();

    for (index, (line_x, line_ys)) in parsed.iter().enumerate() {
        let step = if let Some((next_x, _)) = parsed.get(index + 1) {
            (next_x - line_x) / line_ys.len() as f64
        } else if let Some((previous_x, previous_ys)) =
            index.checked_sub(1).and_then(|i| parsed.get(i))
        {
            (line_x - previous_x) / previous_ys.len() as f64
        } else if let Some(delta) = declared_delta {
            delta
        } else if line_ys.len() == 1 {
            0.0
        } else {
            return Err(malformed(
                source_name,
                "single XYDATA line with no resolvable x increment",
            ));
        };

        for (offset, value) in line_ys.iter().enumerate() {
            x.push(line_x + step * offset as f64);
            y.push(*value);
        }
    }

    Ok((x, y))
}

/// `(XY..XY)`: explicit pairs, separated by whitespace or `;`.
fn parse_xypoints_lines(lines: &[&str], dropped_rows: &mut usize) -> (Vec<f64>, Vec<f64>) {
    let mut x = Vec::new();
    let mut y = Vec::new();

    for line in lines {
        let mut values = Vec::new();
        let mut ok = true;
        for token in line.split([' ', '\t', ',', ';']).filter(|t| !t.is_empty()) {
            match parse_numeric_token(token) {
                Some(value) => values.push(value),
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok || values.len() < 2 || values.len() % 2 != 0 {
            *dropped_rows += 1;
            continue;
        }
        for pair in values.chunks_exact(2) {
            x.push(pair[0]);
            y.push(pair[1]);
        }
    }

    (x, y)
}

/// AFFN numbers only. A token with packed-form letters (SQZ/DIF/DUP) is a
/// structural failure, not a droppable row: silently skipping it would
/// corrupt the x grid for every following sample.
fn parse_affn_line(source_name: &str, line: &str) -> IngestResult<Option<Vec<f64>>> {
    let mut values = Vec::new();
    for token in line.split([' ', '\t', ',', ';']).filter(|t| !t.is_empty()) {
        if token
            .chars()
            .any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E' | 'd' | 'D'))
        {
            return Err(malformed(
                source_name,
                format!("packed (SQZ/DIF/DUP) XYDATA token '{token}' is not supported"),
            ));
        }
        match parse_numeric_token(token) {
            Some(value) => values.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(values))
}

fn raw_delta_x(header: &BTreeMap<String, String>, x_factor: f64) -> Option<f64> {
    if let Some(delta) = header_f64(header, "deltax") {
        return Some(delta / x_factor);
    }

    let first = header_f64(header, "firstx")?;
    let last = header_f64(header, "lastx")?;
    let npoints = header_f64(header, "npoints")?;
    if npoints < 2.0 {
        return None;
    }
    Some((last - first) / ((npoints - 1.0) * x_factor))
}

fn header_f64(header: &BTreeMap<String, String>, key: &str) -> Option<f64> {
    header.get(key).and_then(|value| parse_numeric_token(value))
}

/// JCAMP labels compare with spaces, dashes, and underscores removed.
fn split_record(record: &str) -> (String, &str) {
    let (label, value) = record.split_once('=').unwrap_or((record, ""));
    let normalized: String = label
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '/'))
        .collect::<String>()
        .to_uppercase();
    (normalized, value.trim())
}

fn malformed(source_name: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Malformed {
        format: FORMAT,
        source_name: source_name.to_string(),
        reason: reason.into(),
    }
}
