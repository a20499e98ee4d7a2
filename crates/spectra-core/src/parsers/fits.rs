//! FITS-style binary containers: 80-byte header cards in 2880-byte blocks,
//! a primary data unit holding either a 1-D image vector with world
//! coordinates or a two-column pair table.
//!
//! Axis direction comes from the computed axis itself (a negative CDELT1 is
//! believed only because the data it produces says so), and a redundant
//! header-stated first value is checked against the computed one rather
//! than trusted.

use crate::domain::{
    FormatHint, IngestError, IngestResult, MIN_SPECTRUM_ROWS, RawTable,
};
use crate::numerics::within_tolerance;
use crate::provenance::{ProvenanceStage, ProvenanceStep};
use crate::units::{XUnit, parse_x_unit};
use std::collections::BTreeMap;

const FORMAT: &str = "fits";
const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

pub fn parse_fits(source_name: &str, bytes: &[u8]) -> IngestResult<RawTable> {
    let (header, data_offset) = read_header(source_name, bytes)?;

    let bitpix = header_i64(source_name, &header, "bitpix")?;
    let naxis = header_i64(source_name, &header, "naxis")?;
    let bscale = header_f64_or(&header, "bscale", 1.0);
    let bzero = header_f64_or(&header, "bzero", 0.0);

    let mut warnings = Vec::new();
    let (mut x, mut y) = match naxis {
        1 => {
            let count = header_i64(source_name, &header, "naxis1")? as usize;
            let y = read_scaled_values(source_name, bytes, data_offset, bitpix, count, bscale, bzero)?;
            let x = world_axis(source_name, &header, count)?;
            (x, y)
        }
        2 if header_i64(source_name, &header, "naxis1")? == 2 => {
            let rows = header_i64(source_name, &header, "naxis2")? as usize;
            let flat =
                read_scaled_values(source_name, bytes, data_offset, bitpix, rows * 2, bscale, bzero)?;
            let mut x = Vec::with_capacity(rows);
            let mut y = Vec::with_capacity(rows);
            for pair in flat.chunks_exact(2) {
                x.push(pair[0]);
                y.push(pair[1]);
            }
            (x, y)
        }
        other => {
            return Err(malformed(
                source_name,
                format!("unsupported NAXIS={other}; expected a 1-D vector or 2-column table"),
            ));
        }
    };

    // A redundant declaration of the first axis value is verified against
    // the computed value post-scaling; a mismatch is a warning, and the
    // computed axis wins.
    for keyword in ["xfirst", "wstart"] {
        if let Some(declared) = header.get(keyword).and_then(|v| v.parse::<f64>().ok())
            && let Some(&computed) = x.first()
            && !within_tolerance(declared, computed, 0.0, 1.0e-6, 1.0e-12)
        {
            warnings.push(format!(
                "header {} = {declared} disagrees with computed first axis value {computed}",
                keyword.to_uppercase()
            ));
        }
    }

    // Wavenumber axes are physically positive; offending rows are dropped
    // and counted, never fatal.
    let mut dropped_rows = 0_usize;
    if axis_is_wavenumber(&header) {
        let keep: Vec<bool> = x.iter().map(|&value| value > 0.0).collect();
        dropped_rows = keep.iter().filter(|kept| !**kept).count();
        if dropped_rows > 0 {
            x = filter_by_mask(&x, &keep);
            y = filter_by_mask(&y, &keep);
        }
    }

    if x.len() < MIN_SPECTRUM_ROWS {
        return Err(IngestError::InsufficientSamples {
            source_name: source_name.to_string(),
            rows: x.len(),
            minimum: MIN_SPECTRUM_ROWS,
        });
    }

    let mut step = ProvenanceStep::new(
        ProvenanceStage::Parse,
        format!("parsed fits container ({} samples, BITPIX={bitpix})", x.len()),
    )
    .with_dropped_rows(dropped_rows);
    if !warnings.is_empty() {
        step = step.with_formula(warnings.join("; "));
    }

    Ok(RawTable {
        source_name: source_name.to_string(),
        format: FormatHint::Fits,
        x,
        y,
        aux: None,
        header,
        dropped_rows,
        warnings,
        parse_provenance: vec![step],
    })
}

fn read_header(
    source_name: &str,
    bytes: &[u8],
) -> IngestResult<(BTreeMap<String, String>, usize)> {
    if !bytes.starts_with(b"SIMPLE  =") {
        return Err(malformed(source_name, "missing SIMPLE card"));
    }

    let mut header = BTreeMap::new();
    let mut offset = 0_usize;
    loop {
        let Some(card) = bytes.get(offset..offset + CARD_SIZE) else {
            return Err(malformed(source_name, "header has no END card"));
        };
        offset += CARD_SIZE;

        let keyword = String::from_utf8_lossy(&card[..8]).trim_end().to_string();
        if keyword == "END" {
            break;
        }
        if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
            continue;
        }
        if card.get(8..10) != Some(b"= ") {
            continue;
        }

        let raw_value = String::from_utf8_lossy(&card[10..]).to_string();
        header.insert(keyword.to_lowercase(), parse_card_value(&raw_value));
    }

    // Data begins at the next block boundary after the header.
    let data_offset = offset.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    Ok((header, data_offset))
}

/// Card values: quoted strings, T/F logicals, or numbers; an unquoted `/`
/// starts the inline comment.
fn parse_card_value(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        let end = rest.find('\'').unwrap_or(rest.len());
        return rest[..end].trim_end().to_string();
    }
    let value = trimmed.split('/').next().unwrap_or("").trim();
    value.to_string()
}

fn world_axis(
    source_name: &str,
    header: &BTreeMap<String, String>,
    count: usize,
) -> IngestResult<Vec<f64>> {
    let crval1 = header_f64(header, "crval1");
    let cdelt1 = header_f64(header, "cdelt1").or_else(|| header_f64(header, "cd1_1"));
    let crpix1 = header_f64(header, "crpix1").unwrap_or(1.0);

    let (Some(crval1), Some(cdelt1)) = (crval1, cdelt1) else {
        return Err(malformed(
            source_name,
            "image vector without CRVAL1/CDELT1 world coordinates",
        ));
    };

    Ok((0..count)
        .map(|index| crval1 + ((index + 1) as f64 - crpix1) * cdelt1)
        .collect())
}

fn read_scaled_values(
    source_name: &str,
    bytes: &[u8],
    offset: usize,
    bitpix: i64,
    count: usize,
    bscale: f64,
    bzero: f64,
) -> IngestResult<Vec<f64>> {
    let width = match bitpix {
        8 => 1,
        16 => 2,
        32 | -32 => 4,
        64 | -64 => 8,
        other => {
            return Err(malformed(source_name, format!("unsupported BITPIX={other}")));
        }
    };

    let end = offset + count * width;
    let Some(data) = bytes.get(offset..end) else {
        return Err(malformed(
            source_name,
            format!("data unit truncated; expected {count} samples of {width} bytes"),
        ));
    };

    let mut values = Vec::with_capacity(count);
    for raw in data.chunks_exact(width) {
        let value = match bitpix {
            8 => raw[0] as f64,
            16 => i16::from_be_bytes([raw[0], raw[1]]) as f64,
            32 => i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            64 => i64::from_be_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]) as f64,
            -32 => f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            -64 => f64::from_be_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]),
            _ => unreachable!(),
        };
        values.push(bscale * value + bzero);
    }
    Ok(values)
}

fn axis_is_wavenumber(header: &BTreeMap<String, String>) -> bool {
    if let Some(ctype) = header.get("ctype1") {
        let upper = ctype.to_uppercase();
        if upper.starts_with("WAVN") || upper.starts_with("WNUM") {
            return true;
        }
    }
    header
        .get("cunit1")
        .and_then(|unit| parse_x_unit(unit))
        .is_some_and(|unit| unit == XUnit::ReciprocalCentimetre)
}

fn filter_by_mask(values: &[f64], keep: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(keep)
        .filter_map(|(value, kept)| kept.then_some(*value))
        .collect()
}

fn header_f64(header: &BTreeMap<String, String>, key: &str) -> Option<f64> {
    header.get(key).and_then(|value| value.parse::<f64>().ok())
}

fn header_f64_or(header: &BTreeMap<String, String>, key: &str, default: f64) -> f64 {
    header_f64(header, key).unwrap_or(default)
}

fn header_i64(
    source_name: &str,
    header: &BTreeMap<String, String>,
    key: &str,
) -> IngestResult<i64> {
    header
        .get(key)
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| {
            malformed(
                source_name,
                format!("missing or non-integer {} card", key.to_uppercase()),
            )
        })
}

fn malformed(source_name: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Malformed {
        format: FORMAT,
        source_name: source_name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
pub(crate) fn build_test_fits(cards: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (keyword, value) in cards {
        let mut card = format!("{keyword:<8}= {value}");
        card.truncate(CARD_SIZE);
        let mut card = card.into_bytes();
        card.resize(CARD_SIZE, b' ');
        bytes.extend_from_slice(&card);
    }
    let mut end = b"END".to_vec();
    end.resize(CARD_SIZE, b' ');
    bytes.extend_from_slice(&end);
    let padded = bytes.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    bytes.resize(padded, b' ');
    bytes.extend_from_slice(payload);
    let padded = bytes.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    bytes.resize(padded, 0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::{build_test_fits, parse_fits};
    use crate::domain::IngestError;

    fn f32_payload(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn image_vector_builds_world_axis_and_scales_data() {
        let bytes = build_test_fits(
            &[
                ("SIMPLE", "T"),
                ("BITPIX", "-32"),
                ("NAXIS", "1"),
                ("NAXIS1", "4"),
                ("CRVAL1", "400.0"),
                ("CDELT1", "10.0"),
                ("CRPIX1", "1.0"),
                ("BSCALE", "2.0"),
                ("BZERO", "1.0"),
                ("CUNIT1", "'nm      '"),
            ],
            &f32_payload(&[1.0, 2.0, 3.0, 4.0]),
        );

        let table = parse_fits("scan.fits", &bytes).expect("fits should parse");
        assert_eq!(table.x, vec![400.0, 410.0, 420.0, 430.0]);
        assert_eq!(table.y, vec![3.0, 5.0, 7.0, 9.0]);
        assert_eq!(table.header.get("cunit1").map(String::as_str), Some("nm"));
    }

    #[test]
    fn descending_axis_comes_from_data_not_keyword_convention() {
        let bytes = build_test_fits(
            &[
                ("SIMPLE", "T"),
                ("BITPIX", "-32"),
                ("NAXIS", "1"),
                ("NAXIS1", "3"),
                ("CRVAL1", "600.0"),
                ("CDELT1", "-50.0"),
                ("CUNIT1", "'nm'"),
            ],
            &f32_payload(&[1.0, 2.0, 3.0]),
        );

        let table = parse_fits("desc.fits", &bytes).expect("fits should parse");
        assert_eq!(table.x, vec![600.0, 550.0, 500.0]);
    }

    #[test]
    fn redundant_first_value_mismatch_is_a_warning() {
        let bytes = build_test_fits(
            &[
                ("SIMPLE", "T"),
                ("BITPIX", "-32"),
                ("NAXIS", "1"),
                ("NAXIS1", "3"),
                ("CRVAL1", "400.0"),
                ("CDELT1", "10.0"),
                ("CUNIT1", "'nm'"),
                ("XFIRST", "415.0"),
            ],
            &f32_payload(&[1.0, 2.0, 3.0]),
        );

        let table = parse_fits("mismatch.fits", &bytes).expect("fits should parse");
        assert_eq!(table.warnings.len(), 1);
        assert!(table.warnings[0].contains("XFIRST"));
        assert_eq!(table.x[0], 400.0);
    }

    #[test]
    fn non_positive_wavenumber_rows_are_dropped_and_counted() {
        let bytes = build_test_fits(
            &[
                ("SIMPLE", "T"),
                ("BITPIX", "-64"),
                ("NAXIS", "2"),
                ("NAXIS1", "2"),
                ("NAXIS2", "5"),
                ("CTYPE1", "'WAVN'"),
                ("CUNIT1", "'1/cm'"),
            ],
            &[
                (-5.0_f64, 0.1_f64),
                (0.0, 0.2),
                (100.0, 0.3),
                (200.0, 0.4),
                (300.0, 0.5),
            ]
            .iter()
            .flat_map(|(x, y)| {
                x.to_be_bytes()
                    .into_iter()
                    .chain(y.to_be_bytes())
                    .collect::<Vec<u8>>()
            })
            .collect::<Vec<u8>>(),
        );

        let table = parse_fits("wavn.fits", &bytes).expect("fits should parse");
        assert_eq!(table.x, vec![100.0, 200.0, 300.0]);
        assert_eq!(table.dropped_rows, 2);
        assert_eq!(table.parse_provenance[0].dropped_row_count, Some(2));
    }

    #[test]
    fn truncated_data_unit_is_malformed() {
        let bytes = build_test_fits(
            &[
                ("SIMPLE", "T"),
                ("BITPIX", "-32"),
                ("NAXIS", "1"),
                ("NAXIS1", "4000"),
                ("CRVAL1", "1.0"),
                ("CDELT1", "1.0"),
            ],
            &f32_payload(&[1.0]),
        );

        let error = parse_fits("short.fits", &bytes).expect_err("truncation must fail");
        assert!(matches!(error, IngestError::Malformed { .. }));
    }
}
