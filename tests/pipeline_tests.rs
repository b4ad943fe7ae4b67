use quadcluster::{
    ClusterError, ClusterPipeline, ClusterRecord, ClusterSink, Config, GeoPoint, MemorySink,
    MemorySource, SubdivisionClusterer,
};
use std::collections::{BTreeMap, BTreeSet};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic scatter of points across the world extent.
fn scatter(count: u32) -> Vec<GeoPoint> {
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    (0..count)
        .map(|id| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let lon = -180.0 + (state >> 11) as f64 / (1u64 << 53) as f64 * 360.0;
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let lat = -85.0 + (state >> 11) as f64 / (1u64 << 53) as f64 * 170.0;
            GeoPoint::new(id, lon, lat)
        })
        .collect()
}

fn sorted_records(sink: &MemorySink, collection: &str) -> Vec<ClusterRecord> {
    let mut records = sink.records(collection);
    for record in &mut records {
        record.members.sort_unstable();
    }
    records.sort_by(|a, b| a.quadkey.cmp(&b.quadkey));
    records
}

#[tokio::test]
async fn conservation_per_zoom_level() {
    init_logs();
    let points = scatter(300);
    let config = Config::default().with_zoom_range(3, 9);
    let source = MemorySource::new(points);
    let sink = MemorySink::new();

    let summary = ClusterPipeline::new(config)
        .unwrap()
        .run(&source, &sink)
        .await
        .unwrap();
    assert_eq!(summary.points, 300);
    assert_eq!(summary.assignments, 300 * 6);

    let mut size_per_zoom: BTreeMap<u32, u64> = BTreeMap::new();
    for record in sink.records("clusters") {
        assert_eq!(record.zoom as usize, record.quadkey.len());
        assert_eq!(record.size as usize, record.members.len());
        *size_per_zoom.entry(record.zoom).or_default() += u64::from(record.size);
    }

    let zooms: Vec<u32> = size_per_zoom.keys().copied().collect();
    assert_eq!(zooms, vec![3, 4, 5, 6, 7, 8]);
    assert!(size_per_zoom.values().all(|&total| total == 300));
}

#[tokio::test]
async fn prefix_invariant_across_zoom_levels() {
    let points = scatter(100);
    let config = Config::default().with_zoom_range(2, 8);
    let source = MemorySource::new(points.clone());
    let sink = MemorySink::new();

    ClusterPipeline::new(config)
        .unwrap()
        .run(&source, &sink)
        .await
        .unwrap();

    // Key of each point per zoom, reconstructed from the member lists.
    let mut key_of: BTreeMap<(u32, u32), String> = BTreeMap::new();
    for record in sink.records("clusters") {
        for &id in &record.members {
            let previous = key_of.insert((id, record.zoom), record.quadkey.clone());
            assert!(previous.is_none(), "point {id} in two cells at one zoom");
        }
    }

    for point in &points {
        for zoom in 2..7 {
            let shallow = &key_of[&(point.id, zoom)];
            let deep = &key_of[&(point.id, zoom + 1)];
            assert!(
                deep.starts_with(shallow.as_str()),
                "point {}: {shallow} is not a prefix of {deep}",
                point.id
            );
        }
    }
}

#[tokio::test]
async fn identical_runs_produce_identical_clusters() {
    let points = scatter(200);
    let config = Config::default().with_zoom_range(4, 10);

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let source = MemorySource::new(points.clone());
        let sink = MemorySink::new();
        ClusterPipeline::new(config.clone())
            .unwrap()
            .run(&source, &sink)
            .await
            .unwrap();
        outcomes.push(sorted_records(&sink, "clusters"));
    }

    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn centroids_match_member_means() {
    let points = scatter(150);
    let source = MemorySource::new(points.clone());
    let sink = MemorySink::new();

    ClusterPipeline::new(Config::default().with_zoom_range(2, 6))
        .unwrap()
        .run(&source, &sink)
        .await
        .unwrap();

    let by_id: BTreeMap<u32, &GeoPoint> = points.iter().map(|p| (p.id, p)).collect();
    for record in sink.records("clusters") {
        let n = record.members.len() as f64;
        let mean_lon: f64 = record.members.iter().map(|id| by_id[id].lon()).sum::<f64>() / n;
        let mean_lat: f64 = record.members.iter().map(|id| by_id[id].lat()).sum::<f64>() / n;
        assert!((record.centroid.x() - mean_lon).abs() < 1e-4);
        assert!((record.centroid.y() - mean_lat).abs() < 1e-4);
    }
}

#[tokio::test]
async fn second_run_replaces_first_generation() {
    let sink = MemorySink::new();

    let first = MemorySource::new(scatter(60));
    ClusterPipeline::new(Config::default().with_zoom_range(2, 5))
        .unwrap()
        .run(&first, &sink)
        .await
        .unwrap();
    let generation_one = sink.records("clusters");
    assert!(!generation_one.is_empty());

    // Narrower zoom range and a disjoint id space.
    let second = MemorySource::new(vec![
        GeoPoint::new(1_000, 10.0, 10.0),
        GeoPoint::new(1_001, -10.0, -10.0),
    ]);
    ClusterPipeline::new(Config::default().with_zoom_range(2, 3))
        .unwrap()
        .run(&second, &sink)
        .await
        .unwrap();

    let generation_two = sink.records("clusters");
    assert_eq!(generation_two.len(), 2);
    assert!(
        generation_two
            .iter()
            .all(|r| r.members.iter().all(|&id| id >= 1_000))
    );
}

/// Sink that accepts the truncate but rejects every insert.
struct FullDiskSink;

impl ClusterSink for FullDiskSink {
    fn truncate(&self, _collection: &str) -> quadcluster::Result<()> {
        Ok(())
    }

    fn insert(&self, _collection: &str, _record: &ClusterRecord) -> quadcluster::Result<()> {
        Err(ClusterError::SinkWrite("disk full".to_string()))
    }
}

#[tokio::test]
async fn sink_failure_aborts_the_run() {
    let source = MemorySource::new(scatter(10));
    let result = ClusterPipeline::new(Config::default().with_zoom_range(1, 3))
        .unwrap()
        .run(&source, &FullDiskSink)
        .await;

    match result {
        Err(ClusterError::SinkWrite(message)) => assert_eq!(message, "disk full"),
        other => panic!("expected SinkWrite, got {other:?}"),
    }
}

#[tokio::test]
async fn pipeline_and_subdivision_agree() {
    let points = scatter(120);
    let config = Config::default().with_zoom_range(1, 7);

    let source = MemorySource::new(points.clone());
    let sink = MemorySink::new();
    ClusterPipeline::new(config.clone())
        .unwrap()
        .run(&source, &sink)
        .await
        .unwrap();

    let clusterer = SubdivisionClusterer::new(MemorySource::new(points), config).unwrap();
    let subdivided = clusterer.run().await.unwrap();

    let membership = |records: &[ClusterRecord]| -> BTreeMap<String, BTreeSet<u32>> {
        records
            .iter()
            .map(|r| (r.quadkey.clone(), r.members.iter().copied().collect()))
            .collect()
    };

    let from_pipeline = membership(&sink.records("clusters"));
    let from_subdivision = membership(&subdivided);
    assert_eq!(from_pipeline, from_subdivision);

    // Centroids agree as well, modulo summation order.
    let centroid_of = |records: &[ClusterRecord]| -> BTreeMap<String, (f64, f64)> {
        records
            .iter()
            .map(|r| (r.quadkey.clone(), (r.centroid.x(), r.centroid.y())))
            .collect()
    };
    let subdivision_centroids = centroid_of(&subdivided);
    for (quadkey, (lon, lat)) in centroid_of(&sink.records("clusters")) {
        let (other_lon, other_lat) = subdivision_centroids[&quadkey];
        assert!((lon - other_lon).abs() < 1e-4);
        assert!((lat - other_lat).abs() < 1e-4);
    }
}
