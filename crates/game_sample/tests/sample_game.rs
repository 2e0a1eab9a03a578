//! Integration tests for the Sample Mix family
//!
//! These run real packets through the server pipeline with the family
//! registered, against a private in-memory database with a fixed clock.

use chrono::NaiveDate;
use eamuse_data::{Clock, Database, ManualClock};
use eamuse_protocol::{EamuseProtocol, Node};
use eamuse_server::{GameRegistry, ServerConfig, XrpcRequest, XrpcService};
use game_sample::{daily_song, DAILY_SONG_EVENT};
use std::sync::Arc;

const MIX_1: &str = "SMP:J:A:A:2020060100";
const MIX_2: &str = "SMP:J:A:A:2021060100";
const PCBID: &str = "01201000000000000042";
const CARD: &str = "E004010000000042";

struct Harness {
    service: XrpcService,
    protocol: EamuseProtocol,
    clock: Arc<ManualClock>,
}

/// Helper to create a pipeline with Sample Mix registered and PASELI on
fn create_harness() -> Harness {
    let clock = Arc::new(ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    let database = Database::in_memory().unwrap().with_clock(clock.clone());

    let registry = Arc::new(GameRegistry::new());
    game_sample::register(&registry);

    let mut config = ServerConfig::new("127.0.0.1", 8080);
    config.paseli.enabled = true;

    let protocol = EamuseProtocol::default();
    Harness {
        service: XrpcService::new(protocol.clone(), database, registry, config),
        protocol,
        clock,
    }
}

fn request(service: &str, method: &str) -> Node {
    let mut node = Node::void(service);
    node.set_attribute("method", method);
    node
}

impl Harness {
    async fn raw(&self, model: &str, inner: Node) -> (u16, Option<Node>) {
        let mut call = Node::void("call");
        call.set_attribute("model", model);
        call.set_attribute("srcid", PCBID);
        call.add_child(inner);

        let body = self.protocol.encode(None, None, &call).unwrap();
        let response = self.service.handle(XrpcRequest::new(body)).await;
        let tree = self
            .protocol
            .decode(None, None, &response.body)
            .map(|root| root.children()[0].clone());
        (response.status, tree)
    }

    /// Sends a request that must succeed and returns the inner response
    async fn send(&self, model: &str, inner: Node) -> Node {
        let (status, tree) = self.raw(model, inner).await;
        assert_eq!(status, 200);
        tree.unwrap()
    }

    async fn register_card(&self, model: &str) -> String {
        let mut getrefid = request("cardmng", "getrefid");
        getrefid.set_attribute("cardid", CARD);
        getrefid.set_attribute("passwd", "1234");
        let created = self.send(model, getrefid).await;
        created.attribute("refid").unwrap().to_string()
    }

    async fn inquire(&self, model: &str, inner_model: &str) -> Node {
        let mut inquire = request("cardmng", "inquire");
        inquire.set_attribute("cardid", CARD);
        inquire.set_attribute("model", inner_model);
        self.send(model, inquire).await
    }

    async fn new_profile(&self, model: &str, refid: &str, name: &str) {
        let mut new = request("game", "new");
        new.set_attribute("refid", refid);
        new.add_child(Node::string("name", name));
        self.send(model, new).await;
    }
}

fn note(song: i64, chart: i64, points: i64, time: i64) -> Node {
    Node::void("note")
        .with_child(Node::s32("songid", song as i32))
        .with_child(Node::u8("chart", chart as u8))
        .with_child(Node::s32("points", points as i32))
        .with_child(Node::u64("time", time as u64))
}

fn score_request(refid: &str, notes: Vec<Node>) -> Node {
    let mut score = request("game", "score");
    score.set_attribute("refid", refid);
    for n in notes {
        score.add_child(n);
    }
    score
}

#[tokio::test]
async fn test_versions_are_routed_by_ext() {
    let h = create_harness();

    let old = h.send(MIX_1, request("pcbtracker", "alive")).await;
    assert_eq!(old.attribute("ecenable"), Some("0"));

    let new = h.send(MIX_2, request("pcbtracker", "alive")).await;
    assert_eq!(new.attribute("ecenable"), Some("1"));

    // Before the first release nothing answers.
    let (status, _) = h.raw("SMP:J:A:A:2019010100", request("pcbtracker", "alive")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_play_session() {
    let h = create_harness();
    let refid = h.register_card(MIX_2).await;

    let (_, missing) = h
        .raw(MIX_2, {
            let mut load = request("game", "load");
            load.set_attribute("refid", &refid);
            load
        })
        .await;
    assert_eq!(missing.unwrap().attribute("status"), Some("109"));

    h.new_profile(MIX_2, &refid, "ALICE").await;

    let now = h.clock.now();
    let first = h
        .send(
            MIX_2,
            score_request(&refid, vec![note(1001, 1, 800, now), note(1002, 2, 500, now + 120)]),
        )
        .await;
    let flags: Vec<_> = first.children().iter().map(|m| m.attribute("newrecord")).collect();
    assert_eq!(flags, vec![Some("1"), Some("1")]);

    // A worse play keeps the best score and does not count as a record.
    let second = h
        .send(MIX_2, score_request(&refid, vec![note(1001, 1, 650, now + 240)]))
        .await;
    assert_eq!(second.children()[0].attribute("newrecord"), Some("0"));

    let mut save = request("game", "save");
    save.set_attribute("refid", &refid);
    save.add_child(Node::s32("exp", 40));
    h.send(MIX_2, save).await;

    let mut load = request("game", "load");
    load.set_attribute("refid", &refid);
    let profile = h.send(MIX_2, load).await;
    assert_eq!(profile.child_str("name"), Some("ALICE"));
    assert_eq!(profile.child_int("exp"), Some(40));
    assert_eq!(profile.child_int("plays"), Some(1));
    assert_eq!(profile.child_int("consecutive_days"), Some(1));
    let recent: Vec<_> = profile
        .child("lastplayed")
        .unwrap()
        .children()
        .iter()
        .map(|m| m.attribute("songid").unwrap().to_string())
        .collect();
    assert_eq!(recent, vec!["1001", "1002"]);

    let mut hiscore = request("game", "hiscore");
    hiscore.set_attribute("refid", &refid);
    let scores = h.send(MIX_2, hiscore).await;
    let best = &scores.child("scores").unwrap().children()[0];
    assert_eq!(best.attribute("songid"), Some("1001"));
    assert_eq!(best.child_int("points"), Some(800));
    assert_eq!(best.child_int("plays"), Some(2));
    assert_eq!(best.child_int("achieved"), Some(now));
    let favorite = &scores.child("favorites").unwrap().children()[0];
    assert_eq!(favorite.attribute("songid"), Some("1001"));
    assert_eq!(favorite.attribute("plays"), Some("2"));
}

#[tokio::test]
async fn test_duplicate_attempt_is_a_crash() {
    let h = create_harness();
    let refid = h.register_card(MIX_2).await;
    h.new_profile(MIX_2, &refid, "BOB").await;

    let now = h.clock.now();
    h.send(MIX_2, score_request(&refid, vec![note(1005, 0, 300, now)])).await;
    let (status, _) = h
        .raw(MIX_2, score_request(&refid, vec![note(1005, 0, 900, now)]))
        .await;
    assert_eq!(status, 500);

    let data = h.service.database().data().unwrap();
    let events = data.network().get_events(Some("exception"), 1).await.unwrap();
    assert!(events[0]
        .data
        .get_str("traceback", "")
        .contains("There is already an attempt"));
}

#[tokio::test]
async fn test_profile_carries_forward_on_bind() {
    let h = create_harness();
    let old_refid = h.register_card(MIX_1).await;
    h.new_profile(MIX_1, &old_refid, "CAROL").await;

    // Without an EXT the inner model means "the version before this one".
    let inquiry = h.inquire(MIX_2, "SMP:J:A:A").await;
    assert_eq!(inquiry.attribute("binded"), Some("1"));
    assert_eq!(inquiry.attribute("expired"), Some("1"));
    let new_refid = inquiry.attribute("refid").unwrap().to_string();
    assert_ne!(new_refid, old_refid);

    let mut bind = request("cardmng", "bindmodel");
    bind.set_attribute("refid", &new_refid);
    h.send(MIX_2, bind).await;

    let mut load = request("game", "load");
    load.set_attribute("refid", &new_refid);
    let profile = h.send(MIX_2, load).await;
    assert_eq!(profile.child_str("name"), Some("CAROL"));

    let inquiry = h.inquire(MIX_2, "SMP:J:A:A").await;
    assert_eq!(inquiry.attribute("binded"), Some("1"));
    assert_eq!(inquiry.attribute("expired"), Some("0"));
}

#[tokio::test]
async fn test_shop_updates_machine() {
    let h = create_harness();
    let mut shop = request("game", "shop");
    shop.add_child(
        Node::void("shop")
            .with_child(Node::string("name", "Round Two"))
            .with_child(Node::s8("pref", 13)),
    );
    let reply = h.send(MIX_2, shop).await;
    assert_eq!(reply.child_value("force_unlock").and_then(|v| v.as_bool()), Some(false));

    let data = h.service.database().data().unwrap();
    let machine = data.machine().get_machine(PCBID).await.unwrap().unwrap();
    assert_eq!(machine.name, "Round Two");
    assert_eq!(machine.data.get_int("pref", 0), 13);
    assert_eq!(reply.child_int("machine_id"), Some(machine.id));
}

#[tokio::test]
async fn test_daily_song_is_picked_once_per_day() {
    let h = create_harness();
    let registry = h.service.registry();
    let config = h.service.config();

    let report = registry.run_scheduled_work(h.service.database(), config).await;
    assert_eq!(report.games, 2);
    assert_eq!(report.failures, 0);
    assert_eq!(report.events, 1);

    let again = registry.run_scheduled_work(h.service.database(), config).await;
    assert_eq!(again.events, 0);

    h.clock.advance(86_400);
    let tomorrow = registry.run_scheduled_work(h.service.database(), config).await;
    assert_eq!(tomorrow.events, 1);

    let data = h.service.database().data().unwrap();
    let events = data.network().get_events(Some(DAILY_SONG_EVENT), 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].data.get_str("date", ""), "2024-03-02");
    assert_eq!(
        events[0].data.get_int("song", 0),
        daily_song(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap())
    );
    assert_eq!(events[0].data.get_int("version", 0), 2);
}
