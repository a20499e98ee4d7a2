//! Delimited ASCII tables: variable whitespace, `#` header/comment lines,
//! optional third auxiliary column.

use crate::domain::{
    AuxiliaryColumn, FormatHint, IngestError, IngestResult, MIN_SPECTRUM_ROWS, RawTable,
};
use crate::provenance::{ProvenanceStage, ProvenanceStep};
use std::collections::BTreeMap;

pub fn parse_ascii(source_name: &str, bytes: &[u8]) -> IngestResult<RawTable> {
    let text = String::from_utf8_lossy(bytes);

    let mut header = BTreeMap::new();
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut aux = Vec::new();
    let mut aux_seen = false;
    let mut dropped_rows = 0_usize;
    let mut data_started = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(comment) = trimmed.strip_prefix('#') {
            collect_header_pair(&mut header, comment);
            continue;
        }

        let values = parse_numeric_row(trimmed);
        if values.len() >= 2 {
            data_started = true;
            x.push(values[0]);
            y.push(values[1]);
            if values.len() >= 3 {
                aux_seen = true;
                aux.push(values[2]);
            } else {
                aux.push(f64::NAN);
            }
            continue;
        }

        if data_started {
            // Blank lines and rows that stop parsing after data has begun
            // are counted and skipped, never fatal.
            dropped_rows += 1;
        } else {
            collect_header_pair(&mut header, trimmed);
        }
    }

    if x.len() < MIN_SPECTRUM_ROWS {
        return Err(IngestError::InsufficientSamples {
            source_name: source_name.to_string(),
            rows: x.len(),
            minimum: MIN_SPECTRUM_ROWS,
        });
    }

    let rows = x.len();
    let parse_provenance = vec![
        ProvenanceStep::new(
            ProvenanceStage::Parse,
            format!("parsed delimited ascii table ({rows} rows)"),
        )
        .with_dropped_rows(dropped_rows),
    ];

    Ok(RawTable {
        source_name: source_name.to_string(),
        format: FormatHint::Ascii,
        x,
        y,
        aux: aux_seen.then(|| AuxiliaryColumn {
            name: "column3".to_string(),
            values: aux,
        }),
        header,
        dropped_rows,
        warnings: Vec::new(),
        parse_provenance,
    })
}

/// Extracts `key: value` or `key = value` pairs from a header/comment line;
/// free-text comments are ignored for the metadata map.
fn collect_header_pair(header: &mut BTreeMap<String, String>, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let Some(separator) = trimmed.find([':', '=']) else {
        return;
    };
    let key = trimmed[..separator].trim().to_lowercase();
    let value = trimmed[separator + 1..].trim().to_string();
    if key.is_empty() || value.is_empty() || key.split_whitespace().count() > 3 {
        return;
    }
    header.entry(key).or_insert(value);
}

pub(super) fn parse_numeric_row(line: &str) -> Vec<f64> {
    line.split([' ', '\t', ','])
        .filter(|token| !token.is_empty())
        .map(parse_numeric_token)
        .collect::<Option<Vec<f64>>>()
        .unwrap_or_default()
}

/// Accepts Fortran-style `D` exponents alongside the usual `E` form.
pub(super) fn parse_numeric_token(token: &str) -> Option<f64> {
    let normalized = token.trim().replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::parse_ascii;
    use crate::domain::IngestError;

    #[test]
    fn scenario_header_blank_lines_and_aux_column() {
        let source = "\
# instrument: EchelleSim
# xunits: angstrom
4000.0 1.0 0.9
4010.0 1.1 0.8

4020.0 1.2 0.7

4030.0 1.3 0.6
";
        let table = parse_ascii("scan.txt", source.as_bytes()).expect("table should parse");

        assert_eq!(table.x.len(), 4);
        assert_eq!(table.dropped_rows, 2);
        assert_eq!(table.header.get("xunits").map(String::as_str), Some("angstrom"));
        let aux = table.aux.expect("third column retained");
        assert_eq!(aux.values, vec![0.9, 0.8, 0.7, 0.6]);
        assert_eq!(
            table.parse_provenance[0].dropped_row_count,
            Some(2)
        );
    }

    #[test]
    fn preamble_text_before_data_is_header_not_dropped_rows() {
        let source = "\
Echelle atlas, resampled
observed: 1999-03-02
4000.0 1.0
4010.0 1.1
4020.0 1.2
";
        let table = parse_ascii("atlas.txt", source.as_bytes()).expect("table should parse");
        assert_eq!(table.dropped_rows, 0);
        assert_eq!(
            table.header.get("observed").map(String::as_str),
            Some("1999-03-02")
        );
    }

    #[test]
    fn unparsable_lines_after_data_are_counted() {
        let source = "1.0 2.0\n2.0 3.0\nnot a row\n3.0 4.0\n";
        let table = parse_ascii("t.txt", source.as_bytes()).expect("table should parse");
        assert_eq!(table.x.len(), 3);
        assert_eq!(table.dropped_rows, 1);
    }

    #[test]
    fn two_rows_is_metadata_three_is_a_spectrum() {
        let two = "1.0 2.0\n2.0 3.0\n";
        let error = parse_ascii("two.txt", two.as_bytes()).expect_err("2 rows must fail");
        assert!(matches!(error, IngestError::InsufficientSamples { rows: 2, .. }));

        let three = "1.0 2.0\n2.0 3.0\n3.0 4.0\n";
        assert!(parse_ascii("three.txt", three.as_bytes()).is_ok());
    }

    #[test]
    fn fortran_exponents_parse() {
        let source = "1.0D3 2.5d-1\n2.0E3 3.5e-1\n3.0D3 4.5D-1\n";
        let table = parse_ascii("fort.txt", source.as_bytes()).expect("table should parse");
        assert_eq!(table.x, vec![1000.0, 2000.0, 3000.0]);
        assert!((table.y[0] - 0.25).abs() < 1.0e-12);
    }
}
