//! End-to-end tests: GeoTIFF bands and GeoJSON points on disk, through
//! feature extraction, model selection, scene classification and output.

use landcover_algorithms::classification::{
    select_model, Average, ClassifierFamily, FittedPipeline, HyperparameterGrid, ParamSet,
    SearchParams,
};
use landcover_algorithms::features::{
    build_feature_table, discover_bands, train_test_split, SplitParams,
};
use landcover_algorithms::inference::{
    classify_scene, write_prediction, InferenceParams, SceneRaster,
};
use landcover_algorithms::statistics::ZonalStatistic;
use landcover_core::io::{read_geotiff, read_info, write_geotiff, Compression};
use landcover_core::vector::PointSet;
use landcover_core::{DataType, Error, GeoTransform, Raster, CRS};
use std::fs;
use std::path::{Path, PathBuf};

const ORIGIN_X: f64 = 400000.0;
const ORIGIN_Y: f64 = 5800000.0;
const PIXEL: f64 = 10.0;

fn write_band<F>(dir: &Path, name: &str, rows: usize, cols: usize, value: F) -> PathBuf
where
    F: Fn(usize, usize) -> f64,
{
    let mut raster = Raster::<f64>::new(rows, cols);
    raster.set_transform(GeoTransform::new(ORIGIN_X, ORIGIN_Y, PIXEL, -PIXEL));
    raster.set_crs(Some(CRS::from_epsg(32633)));
    for row in 0..rows {
        for col in 0..cols {
            raster.set(row, col, value(row, col)).unwrap();
        }
    }
    let path = dir.join(format!("{}.tif", name));
    write_geotiff(&raster, &path, None).unwrap();
    path
}

/// Points at pixel centers; label 1 in the left half of the grid, else 0
fn write_points(path: &Path, cells: &[(usize, usize)], half_width: usize) {
    let features: Vec<String> = cells
        .iter()
        .map(|&(row, col)| {
            let x = ORIGIN_X + (col as f64 + 0.5) * PIXEL;
            let y = ORIGIN_Y - (row as f64 + 0.5) * PIXEL;
            let label = if col < half_width { 1 } else { 0 };
            format!(
                r#"{{ "type": "Feature", "properties": {{ "id": {} }},
                   "geometry": {{ "type": "Point", "coordinates": [{}, {}] }} }}"#,
                label, x, y
            )
        })
        .collect();
    let text = format!(
        r#"{{ "type": "FeatureCollection",
             "crs": {{ "type": "name", "properties": {{ "name": "urn:ogc:def:crs:EPSG::32633" }} }},
             "features": [{}] }}"#,
        features.join(",")
    );
    fs::write(path, text).unwrap();
}

/// 100 points spread over a 50x50 grid
fn hundred_cells() -> Vec<(usize, usize)> {
    (0..100).map(|i| ((i * 7) % 50, (i * 13 + i / 50) % 50)).collect()
}

/// Four bands over a 50x50 grid; every band separates left from right
fn four_bands(dir: &Path) {
    for (b, name) in ["B02", "B03", "B04", "B08"].iter().enumerate() {
        let offset = b as f64 * 100.0;
        write_band(dir, name, 50, 50, |row, col| {
            let side = if col < 25 { 0.0 } else { 50.0 };
            offset + side + (row % 5) as f64
        });
    }
}

// ---------------------------------------------------------------------------
// Feature table
// ---------------------------------------------------------------------------

#[test]
fn hundred_points_four_bands() {
    let dir = tempfile::tempdir().unwrap();
    let bands_dir = dir.path().join("bands");
    fs::create_dir(&bands_dir).unwrap();
    four_bands(&bands_dir);
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &hundred_cells(), 25);

    let points = PointSet::from_geojson(&points_path, "id").unwrap();
    let bands = discover_bands(&bands_dir).unwrap();
    let table = build_feature_table(&points, &bands, ZonalStatistic::Min).unwrap();

    assert_eq!(table.n_rows(), 100);
    assert_eq!(table.n_columns(), 5);
    assert_eq!(
        table.column_names(),
        vec!["id", "min_B02", "min_B03", "min_B04", "min_B08"]
    );

    let split = train_test_split(
        &table,
        &SplitParams {
            train_fraction: 0.8,
            seed: Some(1),
        },
    )
    .unwrap();
    assert_eq!(split.train().len(), 80);
    assert_eq!(split.test().len(), 20);
}

#[test]
fn rebuilding_the_table_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    four_bands(dir.path());
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &hundred_cells()[..30], 25);

    let points = PointSet::from_geojson(&points_path, "id").unwrap();
    // The GeoJSON is not a band and is skipped by discovery
    let bands = discover_bands(dir.path()).unwrap();
    assert_eq!(bands.len(), 4);

    let first = build_feature_table(&points, &bands, ZonalStatistic::Min).unwrap();
    let second = build_feature_table(&points, &bands, ZonalStatistic::Min).unwrap();
    assert_eq!(first, second);
}

#[test]
fn partial_band_coverage_is_an_alignment_error() {
    let dir = tempfile::tempdir().unwrap();
    write_band(dir.path(), "B02", 50, 50, |_, _| 1.0);
    // Covers only the top-left 20x20 pixels
    write_band(dir.path(), "B03", 20, 20, |_, _| 1.0);
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &hundred_cells(), 25);

    let points = PointSet::from_geojson(&points_path, "id").unwrap();
    let bands = discover_bands(dir.path()).unwrap();
    match build_feature_table(&points, &bands, ZonalStatistic::Min) {
        Err(Error::RasterAlignment { path, .. }) => assert!(path.ends_with("B03.tif")),
        other => panic!("expected a raster alignment error, got {:?}", other.map(|t| t.n_rows())),
    }
}

#[test]
fn duplicate_band_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_band(dir.path(), "B02", 10, 10, |_, _| 1.0);
    let nested = dir.path().join("again");
    fs::create_dir(&nested).unwrap();
    write_band(&nested, "B02", 10, 10, |_, _| 2.0);
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &[(1, 1), (5, 5)], 5);

    let points = PointSet::from_geojson(&points_path, "id").unwrap();
    let bands = discover_bands(dir.path()).unwrap();
    assert!(matches!(
        build_feature_table(&points, &bands, ZonalStatistic::Min),
        Err(Error::DuplicateColumn { .. })
    ));
}

// ---------------------------------------------------------------------------
// Training, inference and output
// ---------------------------------------------------------------------------

#[test]
fn train_classify_and_write() {
    let dir = tempfile::tempdir().unwrap();
    let bands_dir = dir.path().join("bands");
    fs::create_dir(&bands_dir).unwrap();
    four_bands(&bands_dir);
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &hundred_cells(), 25);

    let points = PointSet::from_geojson(&points_path, "id").unwrap();
    let bands = discover_bands(&bands_dir).unwrap();
    let table = build_feature_table(&points, &bands, ZonalStatistic::Min).unwrap();
    let split = train_test_split(
        &table,
        &SplitParams {
            train_fraction: 0.8,
            seed: Some(5),
        },
    )
    .unwrap();

    let grid = HyperparameterGrid::new(ClassifierFamily::Knn, true)
        .with("n_neighbors", vec![1i64.into(), 3i64.into(), 5i64.into()])
        .with("weights", vec!["uniform".into(), "distance".into()]);
    let selection = select_model(&split.train_view(&table), &grid, &SearchParams::default()).unwrap();
    let metrics = landcover_algorithms::classification::evaluate(
        &selection.pipeline,
        &split.test_view(&table),
        Average::default(),
    )
    .unwrap();
    assert_eq!(metrics.accuracy, 1.0);

    let scene = SceneRaster::from_files(&bands).unwrap();
    let prediction = classify_scene(&selection.pipeline, &scene, &InferenceParams::default()).unwrap();
    assert_eq!(prediction.shape(), (50, 50));
    assert_eq!(prediction.get(10, 3).unwrap(), 1);
    assert_eq!(prediction.get(10, 40).unwrap(), 0);

    let out = dir.path().join("knn_multi.tif");
    write_prediction(&prediction, &scene.profile(), &out).unwrap();
    let info = read_info(&out).unwrap();
    assert_eq!(info.data_type, DataType::UInt8);
    assert_eq!(info.compression, Some(Compression::Lzw));
    assert_eq!(info.profile.transform, scene.profile().transform);
    assert_eq!(info.profile.crs, Some(CRS::from_epsg(32633)));

    let back: Raster<u8> = read_geotiff(&out).unwrap();
    assert_eq!(back.data(), prediction.data());
}

#[test]
fn constant_model_yields_constant_grid() {
    let dir = tempfile::tempdir().unwrap();
    let names = ["B1", "B2", "B3", "B4"];
    for (b, name) in names.iter().enumerate() {
        write_band(dir.path(), name, 10, 10, |row, col| (row * 10 + col + b) as f64);
    }
    let bands = discover_bands(dir.path()).unwrap();
    let schema = landcover_algorithms::features::FeatureSchema::new(
        ZonalStatistic::Min,
        names.iter().map(|n| n.to_string()).collect(),
    )
    .unwrap();

    // Every training row carries label 7
    let x = ndarray::Array2::from_shape_fn((6, 4), |(r, c)| (r * 4 + c) as f64);
    let mut params = ParamSet::new();
    params.insert("n_neighbors".into(), 3i64.into());
    let grid = HyperparameterGrid::new(ClassifierFamily::Knn, true);
    let pipeline = FittedPipeline::fit(&grid, params, schema, x.view(), &[7; 6], 0).unwrap();

    let scene = SceneRaster::from_files(&bands).unwrap();
    let prediction = classify_scene(&pipeline, &scene, &InferenceParams::default()).unwrap();
    assert_eq!(prediction.shape(), (10, 10));
    assert!(prediction.data().iter().all(|&v| v == 7));

    let out = dir.path().join("constant.tif");
    write_prediction(&prediction, &scene.profile(), &out).unwrap();
    assert_eq!(read_info(&out).unwrap().data_type, DataType::UInt8);
}

#[test]
fn repeated_classification_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    four_bands(dir.path());
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &hundred_cells(), 25);

    let points = PointSet::from_path(&points_path, "id").unwrap();
    let bands = discover_bands(dir.path()).unwrap();
    let table = build_feature_table(&points, &bands, ZonalStatistic::Min).unwrap();
    let rows: Vec<usize> = (0..table.n_rows()).collect();
    let view = table.view(&rows);
    let (x, y) = (view.features(), view.labels());
    let scene = SceneRaster::from_files(&bands).unwrap();

    let mut svm = ParamSet::new();
    svm.insert("kernel".into(), "rbf".into());
    svm.insert("C".into(), 10.0.into());
    let mut knn = ParamSet::new();
    knn.insert("n_neighbors".into(), 3i64.into());
    knn.insert("weights".into(), "distance".into());
    let mut forest = ParamSet::new();
    forest.insert("n_estimators".into(), 10i64.into());

    for (family, params) in [
        (ClassifierFamily::Svm, svm),
        (ClassifierFamily::Knn, knn),
        (ClassifierFamily::RandomForest, forest),
    ] {
        let grid = HyperparameterGrid::default_for(family);
        let fit = || {
            FittedPipeline::fit(&grid, params.clone(), table.schema().clone(), x.view(), &y, 0)
                .unwrap()
        };
        let pipeline = fit();
        let first = classify_scene(&pipeline, &scene, &InferenceParams::default()).unwrap();
        let second = classify_scene(&pipeline, &scene, &InferenceParams::default()).unwrap();
        assert_eq!(first.data(), second.data(), "{} repeated", family);

        // Refitting with the same seed reproduces the same grid
        let refit = classify_scene(&fit(), &scene, &InferenceParams::default()).unwrap();
        assert_eq!(first.data(), refit.data(), "{} refit", family);
        assert_eq!(first.get(10, 3).unwrap(), 1, "{}", family);
        assert_eq!(first.get(10, 40).unwrap(), 0, "{}", family);
    }
}

#[test]
fn band_order_mismatch_is_caught() {
    let dir = tempfile::tempdir().unwrap();
    four_bands(dir.path());
    let points_path = dir.path().join("points.geojson");
    write_points(&points_path, &hundred_cells(), 25);

    let points = PointSet::from_geojson(&points_path, "id").unwrap();
    let bands = discover_bands(dir.path()).unwrap();
    let table = build_feature_table(&points, &bands, ZonalStatistic::Min).unwrap();

    let rows: Vec<usize> = (0..table.n_rows()).collect();
    let grid = HyperparameterGrid::new(ClassifierFamily::RandomForest, false)
        .with("n_estimators", vec![5i64.into()]);
    let selection = select_model(&table.view(&rows), &grid, &SearchParams::default()).unwrap();

    let mut reversed = bands.clone();
    reversed.reverse();
    let scene = SceneRaster::from_files(&reversed).unwrap();
    let err = classify_scene(&selection.pipeline, &scene, &InferenceParams::default()).unwrap_err();
    match err {
        Error::FeatureOrderMismatch { expected, found } => {
            assert_eq!(expected, vec!["B02", "B03", "B04", "B08"]);
            assert_eq!(found, vec!["B08", "B04", "B03", "B02"]);
        }
        other => panic!("expected a feature order mismatch, got {other}"),
    }
}
