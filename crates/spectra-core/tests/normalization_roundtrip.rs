use spectra_core::domain::{AxisKind, FormatHint, IngestError, IrMeta, RawTable, YConvention};
use spectra_core::numerics::relative_difference;
use spectra_core::units::{
    NormalizeOptions, NormalizeRequest, XUnit, YInputKind, angstrom_to_micrometre,
    micrometre_to_wavenumber, nanometre_to_angstrom, normalize, parse_x_unit, renormalize,
    wavenumber_to_nanometre,
};

const ROUND_TRIP_TOLERANCE: f64 = 1.0e-9;

fn raw_table(x: Vec<f64>, y: Vec<f64>) -> RawTable {
    RawTable {
        source_name: "roundtrip.dat".to_string(),
        format: FormatHint::Ascii,
        x,
        y,
        aux: None,
        header: Default::default(),
        dropped_rows: 0,
        warnings: Vec::new(),
        parse_provenance: Vec::new(),
    }
}

#[test]
fn wavelength_unit_cycle_is_identity_within_tolerance() {
    for nm in [121.567, 486.135, 656.281, 1083.0, 2500.0, 25000.0] {
        let angstrom = nanometre_to_angstrom(nm);
        let micrometre = angstrom_to_micrometre(angstrom);
        let wavenumber = micrometre_to_wavenumber(micrometre);
        let back = wavenumber_to_nanometre(wavenumber);

        assert!(
            relative_difference(nm, back, 1.0e-30) <= ROUND_TRIP_TOLERANCE,
            "nm -> angstrom -> um -> cm^-1 -> nm drifted: {nm} became {back}"
        );
    }
}

#[test]
fn each_supported_unit_normalizes_to_its_axis_canonical_form() {
    let cases: Vec<(XUnit, Vec<f64>, AxisKind, Vec<f64>)> = vec![
        (
            XUnit::Angstrom,
            vec![4000.0, 5000.0, 6000.0],
            AxisKind::Wavelength,
            vec![400.0, 500.0, 600.0],
        ),
        (
            XUnit::Micrometre,
            vec![0.4, 0.5, 0.6],
            AxisKind::Wavelength,
            vec![400.0, 500.0, 600.0],
        ),
        (
            XUnit::ReciprocalCentimetre,
            vec![2000.0, 3000.0, 4000.0],
            AxisKind::Wavenumber,
            vec![2000.0, 3000.0, 4000.0],
        ),
        (
            XUnit::Millisecond,
            vec![1000.0, 2000.0, 3000.0],
            AxisKind::Time,
            vec![1.0, 2.0, 3.0],
        ),
    ];

    for (unit, input, expected_axis, expected_x) in cases {
        let spectrum = normalize(NormalizeRequest {
            table: raw_table(input, vec![1.0, 2.0, 3.0]),
            x_unit: unit,
            y_kind: YInputKind::Radiometric,
            ir_meta: None,
            source_hash: "hash".to_string(),
            options: NormalizeOptions::default(),
        })
        .expect("normalization should succeed");

        assert_eq!(spectrum.axis_kind, expected_axis, "unit {unit}");
        for (computed, expected) in spectrum.x_values.iter().zip(&expected_x) {
            assert!(
                relative_difference(*computed, *expected, 1.0e-30) <= ROUND_TRIP_TOLERANCE,
                "unit {unit}: {computed} != {expected}"
            );
        }
    }
}

#[test]
fn renormalization_is_a_no_op_with_bit_identical_y() {
    let spectrum = normalize(NormalizeRequest {
        table: raw_table(
            vec![4000.0, 5000.0, 6000.0],
            vec![0.123456789, 0.987654321, 0.5],
        ),
        x_unit: XUnit::Angstrom,
        y_kind: YInputKind::Transmittance,
        ir_meta: None,
        source_hash: "hash".to_string(),
        options: NormalizeOptions::default(),
    })
    .expect("first normalization should succeed");

    let step_count = spectrum.provenance.len();
    assert!(step_count >= 2, "axis and flux conversions must be recorded");
    let y_bits: Vec<u64> = spectrum.y_values.iter().map(|v| v.to_bits()).collect();
    let x_before = spectrum.x_values.clone();

    let again = renormalize(spectrum).expect("renormalization should succeed");
    assert_eq!(
        again.provenance.len(),
        step_count,
        "re-normalizing canonical data must append zero steps"
    );
    assert_eq!(again.x_values, x_before);
    let again_bits: Vec<u64> = again.y_values.iter().map(|v| v.to_bits()).collect();
    assert_eq!(y_bits, again_bits);
}

#[test]
fn absorption_coefficient_requires_both_physical_parameters() {
    let missing = normalize(NormalizeRequest {
        table: raw_table(vec![1000.0, 1100.0, 1200.0], vec![1.0, 2.0, 3.0]),
        x_unit: XUnit::ReciprocalCentimetre,
        y_kind: YInputKind::AbsorptionCoefficient,
        ir_meta: None,
        source_hash: "hash".to_string(),
        options: NormalizeOptions::default(),
    })
    .expect_err("missing parameters must fail");
    assert!(matches!(
        missing,
        IngestError::MissingPhysicalParameter { .. }
    ));

    let spectrum = normalize(NormalizeRequest {
        table: raw_table(vec![1000.0, 1100.0, 1200.0], vec![1.0, 2.0, 3.0]),
        x_unit: XUnit::ReciprocalCentimetre,
        y_kind: YInputKind::AbsorptionCoefficient,
        ir_meta: Some(IrMeta {
            path_length: 10.0,
            mole_fraction: 0.2,
        }),
        source_hash: "hash".to_string(),
        options: NormalizeOptions::default(),
    })
    .expect("complete parameters should succeed");

    assert_eq!(spectrum.y_convention, YConvention::AbsorbanceA10);
    let beer_lambert = spectrum
        .provenance
        .iter()
        .find_map(|step| step.formula_or_method.as_deref())
        .expect("a conversion formula is recorded");
    assert!(beer_lambert.contains("A10 = alpha * L * x / ln(10)"));
}

#[test]
fn unit_alias_table_resolves_plural_and_case_variants() {
    let angstrom_labels = ["angstrom", "Angstroms", "ANG", "aa"];
    for label in angstrom_labels {
        assert_eq!(parse_x_unit(label), Some(XUnit::Angstrom), "{label}");
    }
    assert_eq!(parse_x_unit("light-years"), None);
}
