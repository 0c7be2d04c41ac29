use futures::StreamExt;
use spatio_live::prelude::*;
use spatio_live::{Fields, LiveStream};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

const CENTER: (f64, f64) = (40.5, -80.0);

fn place(geo: &GeoClient<MemoryStore>, lat: f64, lon: f64, kind: &str) -> Fields {
    let point = geo.point(lat, lon).expect("valid point");
    let mut fields = Fields::new();
    fields.insert("position".to_string(), point.data().to_value().expect("geo field"));
    fields.insert("kind".to_string(), kind.into());
    fields
}

/// Places at increasing distance from CENTER:
/// a 0 km, b 0.56 km, c 5.6 km, d 14 km, far 111 km.
async fn seeded() -> (GeoClient<MemoryStore>, MutableQueryRef<MemoryStore>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let geo = GeoClient::new(MemoryStore::new());
    let places = geo.collection("places", None);
    for (id, lat, lon, kind) in [
        ("a", 40.5, -80.0, "cafe"),
        ("b", 40.505, -80.0, "bar"),
        ("c", 40.55, -80.0, "cafe"),
        ("d", 40.6, -80.1, "bar"),
        ("far", 41.5, -80.0, "cafe"),
    ] {
        places
            .set_doc(id, place(&geo, lat, lon, kind))
            .await
            .expect("write");
    }
    (geo, places)
}

fn ids(docs: &[Document]) -> BTreeSet<String> {
    docs.iter().map(|d| d.id.clone()).collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn next_docs(stream: &mut LiveStream<Vec<Document>>) -> Vec<Document> {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("emission within timeout")
        .expect("stream still open")
        .expect("no error")
}

async fn assert_quiet(stream: &mut LiveStream<Vec<Document>>) {
    let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(next.is_err(), "unexpected emission: {:?}", next);
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    cond()
}

#[tokio::test]
async fn test_within_returns_only_documents_inside_radius() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    for (radius, expected) in [
        (0.1, set(&["a"])),
        (1.0, set(&["a", "b"])),
        (10.0, set(&["a", "b", "c"])),
        (20.0, set(&["a", "b", "c", "d"])),
    ] {
        let mut live = places.within(&center, radius, "position").unwrap();
        let docs = next_docs(&mut live).await;
        assert_eq!(ids(&docs), expected, "radius {}", radius);

        for doc in &docs {
            let point = doc.geo_point("position").unwrap();
            assert!(center.distance_to(&point) <= radius);
            let meta = doc.query_metadata.expect("metadata attached");
            assert!((meta.distance - center.distance_to(&point)).abs() < 1e-9);
        }
    }
}

#[tokio::test]
async fn test_within_orders_by_distance() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 20.0, "position").unwrap();
    let docs = next_docs(&mut live).await;
    let order: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_add_and_delete_inside_radius() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 10.0, "position").unwrap();
    let before = next_docs(&mut live).await;
    assert_eq!(before.len(), 3);

    places
        .set_doc("new", place(&geo, 40.45, -80.05, "cafe"))
        .await
        .unwrap();
    let after_add = next_docs(&mut live).await;
    assert_eq!(after_add.len(), 4);
    assert!(after_add.iter().any(|d| d.id == "new"));
    assert_quiet(&mut live).await;

    places.delete("new").await.unwrap();
    let after_delete = next_docs(&mut live).await;
    assert_eq!(after_delete.len(), 3);
    assert!(after_delete.iter().all(|d| d.id != "new"));
}

#[tokio::test]
async fn test_changes_outside_radius_do_not_emit() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 1.0, "position").unwrap();
    assert_eq!(next_docs(&mut live).await.len(), 2);

    // inside the scanned cells but outside the disk
    places
        .set_doc("edge", place(&geo, 40.5, -80.02, "bar"))
        .await
        .unwrap();
    // far away
    places
        .set_doc("elsewhere", place(&geo, -33.9, 151.2, "bar"))
        .await
        .unwrap();
    assert_quiet(&mut live).await;
}

#[tokio::test]
async fn test_moving_document_in_and_out() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 1.0, "position").unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "b"]));

    let closer = geo.point(40.501, -80.0).unwrap();
    places.set_point("c", "position", &closer).await.unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "b", "c"]));

    let away = geo.point(40.7, -80.0).unwrap();
    places.set_point("c", "position", &away).await.unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "b"]));
}

#[tokio::test]
async fn test_within_applies_collection_query() {
    let (geo, _) = seeded().await;
    let cafes = geo.collection("places", Some(query_fn(|q| q.where_eq("kind", "cafe"))));
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = cafes.within(&center, 20.0, "position").unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "c"]));

    cafes.change_query(Some(query_fn(|q| q.where_eq("kind", "bar"))));
    let mut bars = cafes.within(&center, 20.0, "position").unwrap();
    assert_eq!(ids(&next_docs(&mut bars).await), set(&["b", "d"]));
}

#[tokio::test]
async fn test_change_query_replans_running_within() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 20.0, "position").unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "b", "c", "d"]));

    places.change_query(Some(query_fn(|q| q.where_eq("kind", "bar"))));
    assert_eq!(ids(&next_docs(&mut live).await), set(&["b", "d"]));

    // the running search now follows the new definition
    places
        .set_doc("e", place(&geo, 40.51, -80.0, "cafe"))
        .await
        .unwrap();
    places
        .set_doc("f", place(&geo, 40.52, -80.0, "bar"))
        .await
        .unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["b", "d", "f"]));
}

#[tokio::test]
async fn test_change_query_on_collection() {
    let (_, places) = seeded().await;

    let mut live = places.data();
    assert_eq!(next_docs(&mut live).await.len(), 5);

    places.change_query(Some(query_fn(|q| q.where_eq("kind", "bar"))));
    let docs = next_docs(&mut live).await;
    assert_eq!(ids(&docs), set(&["b", "d"]));

    places.change_query(None);
    assert_eq!(next_docs(&mut live).await.len(), 5);
}

#[tokio::test]
async fn test_radius_switch_replaces_result() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut live = places.within_stream(UnboundedReceiverStream::new(rx));

    tx.send(WithinParams::new(center.clone(), 1.0, "position"))
        .unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "b"]));

    tx.send(WithinParams::new(center.clone(), 20.0, "position"))
        .unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a", "b", "c", "d"]));

    tx.send(WithinParams::new(center.clone(), 0.1, "position"))
        .unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["a"]));

    // old range subscriptions are gone: only the current search reacts
    places
        .set_doc("inside_old", place(&geo, 40.55, -80.01, "bar"))
        .await
        .unwrap();
    assert_quiet(&mut live).await;
}

#[tokio::test]
async fn test_rapid_radius_switch_never_mixes() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut live = places.within_stream(UnboundedReceiverStream::new(rx));

    for radius in [20.0, 1.0, 10.0, 0.1] {
        tx.send(WithinParams::new(center.clone(), radius, "position"))
            .unwrap();
    }

    // whatever intermediate searches managed to emit, the stream settles on
    // the last radius and every emission matches one complete radius result
    let valid = [
        set(&["a"]),
        set(&["a", "b"]),
        set(&["a", "b", "c"]),
        set(&["a", "b", "c", "d"]),
    ];
    let mut last = BTreeSet::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(100), live.next()).await
    {
        last = ids(&item.unwrap());
        assert!(valid.contains(&last));
    }
    assert_eq!(last, set(&["a"]));
}

#[tokio::test]
async fn test_invalid_radius() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    assert!(matches!(
        places.within(&center, -1.0, "position"),
        Err(GeoError::InvalidRadius(_))
    ));

    let (tx, rx) = mpsc::unbounded_channel();
    let mut live = places.within_stream(UnboundedReceiverStream::new(rx));
    tx.send(WithinParams::new(center, -5.0, "position"))
        .unwrap();
    let item = live.next().await.expect("terminal error");
    assert!(matches!(item, Err(GeoError::InvalidRadius(_))));
    assert!(live.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_within_stream_releases_subscriptions() {
    let (geo, places) = seeded().await;
    let store = Arc::clone(geo.store());
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 10.0, "position").unwrap();
    next_docs(&mut live).await;
    let open = store.listener_count();
    assert!((1..=9).contains(&open));

    drop(live);
    assert!(wait_until(|| store.listener_count() == 0).await);
}

#[tokio::test]
async fn test_radius_switch_releases_old_subscriptions() {
    let (geo, places) = seeded().await;
    let store = Arc::clone(geo.store());
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut live = places.within_stream(UnboundedReceiverStream::new(rx));

    tx.send(WithinParams::new(center.clone(), 10.0, "position"))
        .unwrap();
    next_docs(&mut live).await;
    let first = store.listener_count();

    tx.send(WithinParams::new(center.clone(), 0.5, "position"))
        .unwrap();
    next_docs(&mut live).await;
    assert!(wait_until(|| store.listener_count() <= first.max(9)).await);

    drop(live);
    assert!(wait_until(|| store.listener_count() == 0).await);
}

#[tokio::test]
async fn test_subscription_error_terminates_within() {
    let (geo, places) = seeded().await;
    let store = Arc::clone(geo.store());
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 10.0, "position").unwrap();
    next_docs(&mut live).await;

    store.inject_error("places", "permission denied");
    let item = live.next().await.expect("terminal error");
    assert!(item.unwrap_err().is_subscription());
    assert!(live.next().await.is_none());

    // re-invoking within is the recovery path
    let mut again = places.within(&center, 10.0, "position").unwrap();
    assert_eq!(next_docs(&mut again).await.len(), 3);
}

#[tokio::test]
async fn test_subscribe_failure_surfaces_on_stream() {
    let (geo, places) = seeded().await;
    geo.store().fail_subscriptions(Some("offline"));
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 10.0, "position").unwrap();
    let item = live.next().await.expect("terminal error");
    assert!(item.is_err());
}

#[tokio::test]
async fn test_first_value_of_within() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let live = places.within(&center, 1.0, "position").unwrap();
    let docs = first_value(live).await.unwrap();
    assert_eq!(ids(&docs), set(&["a", "b"]));
}

#[tokio::test]
async fn test_first_value_of_silent_stream_stays_pending() {
    let (geo, places) = seeded().await;

    // a parameter stream that never yields never produces a result
    let live = places.within_stream(futures::stream::pending::<WithinParams>());
    let result = tokio::time::timeout(Duration::from_millis(50), first_value(live)).await;
    assert!(result.is_err());
    drop(geo);
}

#[tokio::test]
async fn test_write_failures_are_reported() {
    let (geo, places) = seeded().await;
    geo.store().fail_writes(Some("read-only"));

    let err = places
        .set_doc("x", place(&geo, 1.0, 1.0, "cafe"))
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::Write(_)));
    assert!(places.delete("a").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_within_on_multi_thread_runtime() {
    let (geo, places) = seeded().await;
    let center = geo.point(CENTER.0, CENTER.1).unwrap();

    let mut live = places.within(&center, 10.0, "position").unwrap();
    assert_eq!(next_docs(&mut live).await.len(), 3);

    places
        .set_doc("new", place(&geo, 40.45, -80.05, "cafe"))
        .await
        .unwrap();
    assert_eq!(next_docs(&mut live).await.len(), 4);
}

#[tokio::test]
async fn test_antimeridian_search() {
    let geo = GeoClient::new(MemoryStore::new());
    let places = geo.collection("places", None);
    places
        .set_doc("east", place(&geo, 0.0, 179.99, "x"))
        .await
        .unwrap();
    places
        .set_doc("west", place(&geo, 0.0, -179.99, "x"))
        .await
        .unwrap();
    places
        .set_doc("away", place(&geo, 0.0, 178.0, "x"))
        .await
        .unwrap();

    let center = geo.point(0.0, 180.0).unwrap();
    let mut live = places.within(&center, 5.0, "position").unwrap();
    assert_eq!(ids(&next_docs(&mut live).await), set(&["east", "west"]));
}
