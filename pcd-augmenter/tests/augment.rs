use std::path::{Path, PathBuf};

use byteorder::{ByteOrder as _, LittleEndian};
use las::{point::Format, Builder, Reader, Writer};
use pcd_augmenter::{
    extra_bytes::{ExtraBytesDescriptor, ExtraBytesLayout},
    AugmentError, LasAugmenter, PREDICTED_CLASSIFICATION, PROBABILITY_ENTROPY,
};
use pcd_core::{
    classes::{ClassEntry, ClassMapping},
    features::FeatureMatrix,
};

fn classes() -> ClassMapping {
    ClassMapping::new(vec![
        ClassEntry {
            code: 2,
            name: "ground".to_string(),
        },
        ClassEntry {
            code: 6,
            name: "building".to_string(),
        },
    ])
    .unwrap()
}

fn write_fixture(path: &Path, positions: &[[f64; 3]], layout: Option<(&ExtraBytesLayout, u8)>) {
    let mut builder = Builder::from((1, 4));
    builder.point_format = Format::new(0).unwrap();
    let mut extra_len = 0;
    if let Some((layout, _)) = layout {
        extra_len = layout.record_len().unwrap();
        builder.point_format.extra_bytes = extra_len as u16;
        builder.vlrs.push(layout.to_vlr());
    }
    let header = builder.into_header().unwrap();
    let mut writer = Writer::from_path(path, header).unwrap();
    for (i, &[x, y, z]) in positions.iter().enumerate() {
        let fill = layout.map(|(_, byte)| byte).unwrap_or(0);
        let mut extra_bytes = vec![fill; extra_len];
        if let Some(first) = extra_bytes.first_mut() {
            *first = i as u8;
        }
        writer
            .write_point(las::Point {
                x,
                y,
                z,
                extra_bytes,
                ..Default::default()
            })
            .unwrap();
    }
    writer.close().unwrap();
}

fn read_back(path: &Path) -> (ExtraBytesLayout, Vec<las::Point>) {
    let mut reader = Reader::from_path(path).unwrap();
    let layout = ExtraBytesLayout::from_vlrs(reader.header().vlrs()).unwrap();
    let points = reader.points().collect::<Result<Vec<_>, _>>().unwrap();
    (layout, points)
}

fn offset_of(layout: &ExtraBytesLayout, name: &str) -> usize {
    layout.find(name).unwrap().unwrap().0
}

const POSITIONS: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.5, 2.0, 0.25], [10.0, -4.0, 3.0]];

#[test]
fn augments_and_persists_tile() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    write_fixture(&input, &POSITIONS, None);

    let augmenter = LasAugmenter::new(classes(), &["building".to_string()]).unwrap();
    let mut tile = augmenter.open_for_update(&input).unwrap();
    assert_eq!(tile.len(), 3);
    assert_eq!(tile.positions()[1], [1.5, 2.0, 0.25]);

    let logits = FeatureMatrix::from_rows(&[[2.0f32, 0.0], [0.0, 3.0], [1.0, 1.0]]).unwrap();
    augmenter.fill(&mut tile, &logits).unwrap();

    let output = dir.path().join("out").join("nested").join("tile.las");
    let written = augmenter.persist(tile, &output).unwrap();
    assert_eq!(written, output);

    let (layout, points) = read_back(&output);
    assert_eq!(points.len(), 3);
    for (point, expected) in points.iter().zip(POSITIONS) {
        assert_eq!([point.x, point.y, point.z], expected);
    }

    let predicted = offset_of(&layout, PREDICTED_CLASSIFICATION);
    let entropy = offset_of(&layout, PROBABILITY_ENTROPY);
    let building = offset_of(&layout, "building");

    let codes: Vec<i64> = points
        .iter()
        .map(|p| LittleEndian::read_i64(&p.extra_bytes[predicted..predicted + 8]))
        .collect();
    // ties keep the first class
    assert_eq!(codes, vec![2, 6, 2]);

    let p_building = LittleEndian::read_f64(&points[0].extra_bytes[building..building + 8]);
    assert!((p_building - 0.119_203).abs() < 1e-5);
    let h = LittleEndian::read_f64(&points[0].extra_bytes[entropy..entropy + 8]);
    assert!((h - 0.365_334).abs() < 1e-5);

    let h_uniform = LittleEndian::read_f64(&points[2].extra_bytes[entropy..entropy + 8]);
    assert!((h_uniform - 2f64.ln()).abs() < 1e-6);
}

#[test]
fn reuses_compatible_channel_and_keeps_existing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    let mut layout = ExtraBytesLayout::default();
    layout
        .push(ExtraBytesDescriptor::with_data_type("point_tag", 1, ""))
        .unwrap();
    layout
        .push(ExtraBytesDescriptor::with_data_type(PROBABILITY_ENTROPY, 10, ""))
        .unwrap();
    write_fixture(&input, &POSITIONS, Some((&layout, 0xAB)));

    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let mut tile = augmenter.open_for_update(&input).unwrap();
    assert_eq!(tile.layout().descriptors().len(), 3);

    let logits = FeatureMatrix::from_rows(&[[0.0f32, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
    augmenter.fill(&mut tile, &logits).unwrap();
    let output = dir.path().join("augmented.las");
    augmenter.persist(tile, &output).unwrap();

    let (layout, points) = read_back(&output);
    assert_eq!(offset_of(&layout, PROBABILITY_ENTROPY), 1);
    assert_eq!(offset_of(&layout, PREDICTED_CLASSIFICATION), 9);
    for (i, point) in points.iter().enumerate() {
        assert_eq!(point.extra_bytes.len(), 17);
        assert_eq!(point.extra_bytes[0], i as u8);
        assert_eq!(LittleEndian::read_i64(&point.extra_bytes[9..17]), 6);
    }
}

#[test]
fn incompatible_channel_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    let mut layout = ExtraBytesLayout::default();
    layout
        .push(ExtraBytesDescriptor::with_data_type(PREDICTED_CLASSIFICATION, 6, ""))
        .unwrap();
    write_fixture(&input, &POSITIONS, Some((&layout, 0)));

    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let err = augmenter.open_for_update(&input).unwrap_err();
    assert!(matches!(
        err,
        AugmentError::UnsupportedAttributeType {
            expected: 8,
            found: 6,
            ..
        }
    ));
}

#[test]
fn missing_input_is_reported() {
    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let err = augmenter
        .open_for_update(&PathBuf::from("/definitely/not/here.las"))
        .unwrap_err();
    assert!(matches!(err, AugmentError::MissingFile { .. }));
}

#[test]
fn logits_must_align_with_points() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    write_fixture(&input, &POSITIONS, None);

    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let mut tile = augmenter.open_for_update(&input).unwrap();
    let logits = FeatureMatrix::from_rows(&[[0.0f32, 1.0]]).unwrap();
    assert!(matches!(
        augmenter.fill(&mut tile, &logits),
        Err(AugmentError::DimensionMismatch { .. })
    ));
}

#[test]
fn unknown_probability_class_is_rejected() {
    let err = LasAugmenter::new(classes(), &["water".to_string()]).unwrap_err();
    assert!(matches!(err, AugmentError::Core(_)));
}

#[test]
fn failed_write_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    write_fixture(&input, &POSITIONS, None);

    // a regular file where the output directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let output = blocker.join("tile.las");

    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let tile = augmenter.open_for_update(&input).unwrap();
    let err = augmenter.persist(tile, &output).unwrap_err();
    assert!(matches!(err, AugmentError::WriteFailure { .. }));
    assert!(!output.exists());
}

#[test]
fn managed_channel_name_cannot_carry_probabilities() {
    let classes = ClassMapping::new(vec![
        ClassEntry {
            code: 2,
            name: "ground".to_string(),
        },
        ClassEntry {
            code: 9,
            name: PROBABILITY_ENTROPY.to_string(),
        },
    ])
    .unwrap();
    let err = LasAugmenter::new(classes, &[PROBABILITY_ENTROPY.to_string()]).unwrap_err();
    assert!(matches!(err, AugmentError::ReservedChannelName(name) if name == PROBABILITY_ENTROPY));
}

#[test]
fn source_header_metadata_survives() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    let mut builder = Builder::from((1, 4));
    builder.point_format = Format::new(1).unwrap();
    builder.has_wkt_crs = true;
    builder.has_synthetic_return_numbers = true;
    builder.system_identifier = "survey scanner".to_string();
    let mut writer = Writer::from_path(&input, builder.into_header().unwrap()).unwrap();
    for &[x, y, z] in &POSITIONS {
        writer
            .write_point(las::Point {
                x,
                y,
                z,
                gps_time: Some(12.5),
                ..Default::default()
            })
            .unwrap();
    }
    writer.close().unwrap();

    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let tile = augmenter.open_for_update(&input).unwrap();
    let output = dir.path().join("out.las");
    augmenter.persist(tile, &output).unwrap();

    let mut reader = Reader::from_path(&output).unwrap();
    let header = reader.header().clone();
    assert!(header.has_wkt_crs());
    assert!(header.has_synthetic_return_numbers());
    assert_eq!(header.system_identifier(), "survey scanner");
    assert_eq!(header.point_format().to_u8().unwrap(), 1);
    assert_eq!(header.number_of_points(), 3);
    let point = reader.points().next().unwrap().unwrap();
    assert_eq!(point.gps_time, Some(12.5));
}

#[test]
fn compressed_output_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    write_fixture(&input, &POSITIONS, None);

    let augmenter = LasAugmenter::new(classes(), &["ground".to_string()]).unwrap();
    let mut tile = augmenter.open_for_update(&input).unwrap();
    let logits = FeatureMatrix::from_rows(&[[2.0f32, 0.0], [0.0, 3.0], [1.0, 1.0]]).unwrap();
    augmenter.fill(&mut tile, &logits).unwrap();
    let laz = dir.path().join("tile.laz");
    augmenter.persist(tile, &laz).unwrap();

    let reader = Reader::from_path(&laz).unwrap();
    assert!(reader.header().point_format().is_compressed);
    let (layout, points) = read_back(&laz);
    assert_eq!(points.len(), 3);
    let predicted = offset_of(&layout, PREDICTED_CLASSIFICATION);
    let codes: Vec<i64> = points
        .iter()
        .map(|p| LittleEndian::read_i64(&p.extra_bytes[predicted..predicted + 8]))
        .collect();
    assert_eq!(codes, vec![2, 6, 2]);

    // augmenting the compressed file again writes plain LAS without a laszip record
    let tile = augmenter.open_for_update(&laz).unwrap();
    let plain = dir.path().join("again.las");
    augmenter.persist(tile, &plain).unwrap();
    let reader = Reader::from_path(&plain).unwrap();
    assert!(!reader.header().point_format().is_compressed);
    assert!(!reader.header().vlrs().iter().any(las::laz::is_laszip_vlr));
    let (layout, points) = read_back(&plain);
    assert_eq!(points.len(), 3);
    assert_eq!(layout.descriptors().len(), 3);
}

#[cfg(unix)]
#[test]
fn output_keeps_source_permissions() {
    use std::os::unix::fs::PermissionsExt as _;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tile.las");
    write_fixture(&input, &POSITIONS, None);
    std::fs::set_permissions(&input, std::fs::Permissions::from_mode(0o440)).unwrap();

    let augmenter = LasAugmenter::new(classes(), &[]).unwrap();
    let tile = augmenter.open_for_update(&input).unwrap();
    let output = dir.path().join("out.las");
    augmenter.persist(tile, &output).unwrap();

    let mode = std::fs::metadata(&output).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o440);
}
