mod helpers;

use geobot::geo::Position;
use geobot::service::{ProximityPolicy, ServiceError};
use helpers::{test_service, test_service_with};

#[tokio::test]
async fn set_then_get_round_trips_position() {
    let svc = test_service();
    for (lat, lon) in [(52.52, 13.405), (-33.8688, 151.2093), (90.0, -180.0), (0.0, 0.0)] {
        svc.set_location("u", lat, lon).await.unwrap();
        let loc = svc.location_of("u").await.unwrap();
        assert_eq!(loc.position, Position::new(lat, lon).unwrap());
    }
}

#[tokio::test]
async fn second_set_location_overwrites_first() {
    let svc = test_service();
    svc.set_location("u", 10.0, 10.0).await.unwrap();
    svc.set_location("u", 20.0, 20.0).await.unwrap();

    let loc = svc.location_of("u").await.unwrap();
    assert_eq!(loc.position.latitude(), 20.0);
    assert_eq!(loc.position.longitude(), 20.0);
}

#[tokio::test]
async fn post_before_set_location_is_a_precondition_failure() {
    let svc = test_service();
    let err = svc.post_message("new-user", "hello").await.unwrap_err();
    assert!(matches!(err, ServiceError::LocationRequired(_)));
}

#[tokio::test]
async fn nearby_is_bounded_by_limit_and_radius() {
    let policy = ProximityPolicy {
        limit: 100,
        radius_meters: 200.0,
        ..ProximityPolicy::default()
    };
    let svc = test_service_with(policy);

    // 120 条在中心点，10 条在约 1 km 外
    svc.set_location("poster", 48.8566, 2.3522).await.unwrap();
    for i in 0..120 {
        svc.post_message("poster", &format!("near {i}")).await.unwrap();
    }
    svc.set_location("poster", 48.8656, 2.3522).await.unwrap();
    for i in 0..10 {
        svc.post_message("poster", &format!("far {i}")).await.unwrap();
    }

    svc.set_location("reader", 48.8567, 2.3523).await.unwrap();
    let center = svc.location_of("reader").await.unwrap().position;
    let found = svc.query_nearby("reader").await.unwrap();

    assert_eq!(found.len(), 100);
    for m in &found {
        assert!(center.distance_to(&m.message.position) <= 200.0);
        assert!(m.message.content.starts_with("near"));
    }
}

#[tokio::test]
async fn nearby_results_are_most_recent_first() {
    let svc = test_service();
    svc.set_location("u", 35.6762, 139.6503).await.unwrap();
    for i in 0..30 {
        svc.post_message("u", &format!("m{i}")).await.unwrap();
    }

    let found = svc.query_nearby("u").await.unwrap();
    assert_eq!(found.len(), 30);
    for pair in found.windows(2) {
        assert!(pair[0].message.created_at >= pair[1].message.created_at);
    }
    assert_eq!(found[0].message.content, "m29");
}

#[tokio::test]
async fn berlin_scenario() {
    let svc = test_service();
    svc.set_location("A", 52.52, 13.405).await.unwrap();
    svc.post_message("A", "hello").await.unwrap();

    svc.set_location("B", 52.521, 13.406).await.unwrap();
    let found = svc.query_nearby("B").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message.content, "hello");
    assert!(found[0].line.ends_with("] hello"));
    assert_eq!(
        found[0].line,
        format!(
            "[{}] hello",
            found[0].message.created_at.format("%Y-%m-%d %H:%M:%S")
        )
    );

    // 从未设置位置的用户
    let err = svc.query_nearby("C").await.unwrap_err();
    assert!(matches!(err, ServiceError::LocationRequired(_)));

    // 设置在 (0, 0) 后得到空列表
    svc.set_location("C", 0.0, 0.0).await.unwrap();
    assert!(svc.query_nearby("C").await.unwrap().is_empty());
}

#[tokio::test]
async fn message_position_is_fixed_at_post_time() {
    let svc = test_service();
    svc.set_location("A", 40.7128, -74.0060).await.unwrap();
    let first = svc.post_message("A", "first").await.unwrap();

    svc.set_location("A", 51.5074, -0.1278).await.unwrap();
    svc.post_message("A", "second").await.unwrap();

    svc.set_location("reader", 40.7128, -74.0060).await.unwrap();
    let found = svc.query_nearby("reader").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message.message_id, first);
    assert_eq!(
        found[0].message.position,
        Position::new(40.7128, -74.0060).unwrap()
    );
}

#[tokio::test]
async fn concurrent_users_do_not_interfere() {
    let svc = test_service();
    let mut handles = Vec::new();
    for i in 0..16 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let user = format!("user-{i}");
            let lat = -60.0 + i as f64 * 7.0;
            svc.set_location(&user, lat, 0.0).await.unwrap();
            svc.post_message(&user, &user).await.unwrap();
            svc.query_nearby(&user).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let found = handle.await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message.content, format!("user-{i}"));
    }
}
