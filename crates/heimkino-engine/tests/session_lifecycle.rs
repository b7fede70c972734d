use heimkino_core::{
    CompletionBucket, ContentMetadata, ContentType, DayType, GenreId, RecommendationRequest,
    SessionFeedback, TimeOfDay, ViewingContext,
};
use heimkino_engine::{EngineConfig, RecommendationOrchestrator, SessionPhase};

fn item(id: &str, genre: u32, popularity: f64) -> ContentMetadata {
    ContentMetadata {
        content_id: id.to_string(),
        title: None,
        genres: vec![GenreId(genre)],
        content_type: ContentType::Movie,
        year: 2015,
        duration_minutes: 100,
        popularity,
        rating: Some(7.0),
        keywords: vec!["friendship".to_string()],
    }
}

fn engine(seed: u64) -> RecommendationOrchestrator {
    let config = EngineConfig {
        seed: Some(seed),
        ..EngineConfig::default()
    };
    let mut engine = RecommendationOrchestrator::new(config).expect("default config is valid");
    for meta in [item("mad-max", 28, 90.0), item("moonlight", 18, 40.0), item("airplane", 35, 15.0)] {
        engine.register_content(meta).expect("valid registration");
    }
    engine
}

fn evening_weekend_request() -> RecommendationRequest {
    RecommendationRequest {
        context: ViewingContext {
            time_of_day: TimeOfDay::Evening,
            day_type: DayType::Weekend,
            recent_genres: vec![],
            completion_bucket: CompletionBucket::Low,
            last_completed: None,
        },
        candidate_pool: vec!["mad-max".into(), "moonlight".into(), "airplane".into()],
        count: 3,
    }
}

#[test]
fn cold_start_always_returns_a_ranked_list() {
    for seed in 0..50 {
        let mut e = engine(seed);
        assert!((e.current_epsilon() - 0.3).abs() < 1e-12);
        let resp = e
            .get_recommendations(&evening_weekend_request())
            .expect("cold start must not fail");
        assert_eq!(resp.ranked.len(), 3, "seed {seed} strategy {}", resp.chosen_strategy);
        assert!(resp.ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn full_session_raises_the_chosen_value() {
    let mut e = engine(7);
    let resp = e
        .get_recommendations(&evening_weekend_request())
        .expect("recommendations");
    let top = resp.ranked[0].content_id.clone();
    let before = e.q_value(&resp.state, resp.chosen_strategy);

    e.start_session(&top).expect("top item was offered");
    let outcome = e
        .record_session(&SessionFeedback {
            content_id: top.clone(),
            watch_duration_seconds: 5400.0,
            completion_rate: 0.9,
            user_rating: Some(5),
            engagement: None,
        })
        .expect("session recorded");

    let after = e.q_value(&resp.state, resp.chosen_strategy);
    assert!(after > before, "{before} -> {after}");
    assert!(outcome.reward > 0.0);
    assert_eq!(outcome.action, resp.chosen_strategy);
    assert!((outcome.q_after - after).abs() < 1e-12);
    assert_eq!(e.phase(), SessionPhase::Idle);

    let stats = e.get_stats();
    assert_eq!(stats.total_experiences, 1);
    assert_eq!(stats.distinct_states_visited, 1);
    assert_eq!(stats.avg_recent_reward, Some(outcome.reward));
}

#[test]
fn same_seed_same_recommendations() {
    let mut a = engine(99);
    let mut b = engine(99);
    for _ in 0..10 {
        let ra = a.get_recommendations(&evening_weekend_request()).expect("a");
        let rb = b.get_recommendations(&evening_weekend_request()).expect("b");
        assert_eq!(ra, rb);
    }
}

#[test]
fn watching_moves_the_state_forward() {
    let mut e = engine(3);
    let resp = e.get_recommendations(&evening_weekend_request()).expect("recommendations");
    let top = resp.ranked[0].content_id.clone();
    let genre = e.content(&top).expect("registered").genres[0];
    e.start_session(&top).expect("start");
    let outcome = e
        .record_session(&SessionFeedback {
            content_id: top,
            watch_duration_seconds: 6000.0,
            completion_rate: 1.0,
            user_rating: None,
            engagement: Some(0.8),
        })
        .expect("record");
    assert_eq!(outcome.next_state.recent_genres(), &[genre]);
    assert_eq!(outcome.next_state.avg_completion_bucket(), CompletionBucket::Medium);
}

#[test]
fn replay_retrains_on_recorded_sessions() {
    let mut e = engine(11);
    assert_eq!(e.replay(None).applied, 0);
    for _ in 0..5 {
        let resp = e.get_recommendations(&evening_weekend_request()).expect("recommendations");
        let top = resp.ranked[0].content_id.clone();
        e.start_session(&top).expect("start");
        e.record_session(&SessionFeedback {
            content_id: top,
            watch_duration_seconds: 3000.0,
            completion_rate: 0.5,
            user_rating: Some(3),
            engagement: None,
        })
        .expect("record");
    }
    let report = e.replay(Some(3));
    assert_eq!(report.applied, 3);
    assert_eq!(e.replay(None).applied, 5);
    // replay learns, it does not record
    assert_eq!(e.get_stats().total_experiences, 5);

    let by_action = e.outcome_statistics();
    assert_eq!(by_action.values().map(|s| s.total).sum::<usize>(), 5);
    let profile = e.preference_profile();
    assert_eq!(profile.experiences_considered, 5);
    assert!(profile.preferred_strategy.contains_key(&TimeOfDay::Evening));
}
