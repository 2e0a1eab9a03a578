//! The `game` service.
//!
//! | Method    | Purpose                                          |
//! |-----------|--------------------------------------------------|
//! | `shop`    | cabinet reports its shop name and prefecture     |
//! | `load`    | profile, play statistics and recent songs        |
//! | `new`     | create a profile for a freshly registered card   |
//! | `save`    | store profile changes and count the play         |
//! | `score`   | record the songs of one credit                   |
//! | `hiscore` | a player's best scores and most played songs     |

use crate::handler::SampleGame;
use eamuse_data::{PlayRecord, UserId, ValidatedDict};
use eamuse_protocol::Node;
use eamuse_server::{status, GameHandler, MethodFuture};
use tracing::debug;

/// Recently played songs returned by `load`.
const LAST_PLAYED_COUNT: usize = 5;
/// Favourite songs returned by `hiscore`.
const MOST_PLAYED_COUNT: usize = 10;

fn with_status(code: u32) -> Node {
    let mut root = Node::void("game");
    root.set_attribute("status", code.to_string());
    root
}

async fn user_for(game: &SampleGame, request: &Node) -> anyhow::Result<Option<UserId>> {
    let Some(refid) = request.attribute("refid") else {
        return Ok(None);
    };
    let base = game.base();
    Ok(base
        .data()
        .user()
        .from_refid(base.game(), base.version(), refid)
        .await?)
}

fn to_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

pub fn shop<'a>(game: &'a SampleGame, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let shop = request.child("shop");

        base.update_machine_name(shop.and_then(|s| s.child_str("name")))
            .await?;
        if let Some(pref) = shop.and_then(|s| s.child_int("pref")) {
            let mut data = ValidatedDict::new();
            data.replace_int("pref", pref);
            base.update_machine_data(data).await?;
        }

        let config = base.get_game_config().await?;
        let mut root = Node::void("game");
        root.add_child(Node::s64("machine_id", base.get_machine_id().await?));
        root.add_child(Node::bool(
            "force_unlock",
            config.get_bool("force_unlock_songs", false),
        ));
        Ok(Some(root))
    })
}

pub fn load<'a>(game: &'a SampleGame, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let Some(userid) = user_for(game, request).await? else {
            return Ok(Some(with_status(status::NO_PROFILE)));
        };
        let Some(profile) = base.get_profile(userid).await? else {
            return Ok(Some(with_status(status::NO_PROFILE)));
        };
        let stats = base.get_play_statistics(userid).await?;

        let mut root = Node::void("game");
        root.add_child(Node::string("name", profile.get_str("name", "")));
        root.add_child(Node::s32("exp", to_i32(profile.get_int("exp", 0))));
        root.add_child(Node::s32("plays", to_i32(stats.get_int("total_plays", 0))));
        root.add_child(Node::s32("today_plays", to_i32(stats.get_int("today_plays", 0))));
        root.add_child(Node::s32(
            "consecutive_days",
            to_i32(stats.get_int("consecutive_days", 0)),
        ));

        let mut recent = Node::void("lastplayed");
        for song in base
            .data()
            .music()
            .get_last_played(base.game(), base.version(), userid, LAST_PLAYED_COUNT)
            .await?
        {
            let mut music = Node::void("music");
            music.set_attribute("songid", song.song_id.to_string());
            music.set_attribute("chart", song.chart.to_string());
            recent.add_child(music);
        }
        root.add_child(recent);
        Ok(Some(root))
    })
}

pub fn create<'a>(game: &'a SampleGame, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let Some(userid) = user_for(game, request).await? else {
            return Ok(Some(with_status(status::NOT_REGISTERED)));
        };

        let mut profile = ValidatedDict::new();
        profile.replace_str("name", request.child_str("name").unwrap_or("PLAYER"));
        profile.replace_int("exp", 0);
        base.put_profile(userid, &profile).await?;
        debug!("Created {} profile for user {}", base.info().name, userid);

        Ok(Some(Node::void("game")))
    })
}

pub fn save<'a>(game: &'a SampleGame, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let Some(userid) = user_for(game, request).await? else {
            return Ok(Some(with_status(status::NOT_REGISTERED)));
        };
        let Some(mut profile) = base.get_profile(userid).await? else {
            return Ok(Some(with_status(status::NO_PROFILE)));
        };

        if let Some(name) = request.child_str("name") {
            profile.replace_str("name", name);
        }
        let gained = request.child_int("exp").unwrap_or(0).max(0);
        profile.replace_int("exp", profile.get_int("exp", 0).saturating_add(gained));
        base.put_profile(userid, &profile).await?;
        base.update_play_statistics(userid, None).await?;

        Ok(Some(Node::void("game")))
    })
}

/// Records every `note` under the request. Guest plays only reach the
/// attempt history.
pub fn score<'a>(game: &'a SampleGame, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let music = base.data().music();
        let userid = user_for(game, request).await?;
        let location = base.get_machine_id().await?;

        let mut root = Node::void("game");
        for note in request.children().iter().filter(|c| c.name() == "note") {
            let (Some(song_id), Some(chart), Some(points)) = (
                note.child_int("songid"),
                note.child_int("chart"),
                note.child_int("points"),
            ) else {
                debug!("Skipping incomplete note");
                continue;
            };

            let best = match userid {
                Some(userid) => music
                    .get_score(base.game(), base.version(), userid, song_id, chart)
                    .await?
                    .map(|s| s.points),
                None => None,
            };
            let new_record = best.map_or(true, |best| points > best);

            let mut play = PlayRecord {
                song_id,
                chart,
                location,
                points,
                new_record,
                timestamp: note.child_int("time"),
                ..PlayRecord::default()
            };
            music
                .put_attempt(base.game(), base.version(), userid, &play)
                .await?;
            if let Some(userid) = userid {
                play.points = best.map_or(points, |best| best.max(points));
                music
                    .put_score(base.game(), base.version(), userid, &play)
                    .await?;
            }

            let mut result = Node::void("music");
            result.set_attribute("songid", song_id.to_string());
            result.set_attribute("chart", chart.to_string());
            result.set_attribute("newrecord", if new_record { "1" } else { "0" });
            root.add_child(result);
        }
        Ok(Some(root))
    })
}

pub fn hiscore<'a>(game: &'a SampleGame, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let Some(userid) = user_for(game, request).await? else {
            return Ok(Some(with_status(status::NO_PROFILE)));
        };
        let music = base.data().music();

        let mut scores = Node::void("scores");
        for score in music
            .get_scores(base.game(), base.version(), userid, None, None)
            .await?
        {
            let mut entry = Node::void("music");
            entry.set_attribute("songid", score.song_id.to_string());
            entry.set_attribute("chart", score.chart.to_string());
            entry.add_child(Node::s32("points", to_i32(score.points)));
            entry.add_child(Node::s32("plays", to_i32(score.plays)));
            entry.add_child(Node::u64("achieved", u64::try_from(score.timestamp).unwrap_or(0)));
            scores.add_child(entry);
        }

        let mut favorites = Node::void("favorites");
        for song in music
            .get_most_played(base.game(), base.version(), userid, MOST_PLAYED_COUNT)
            .await?
        {
            let mut entry = Node::void("music");
            entry.set_attribute("songid", song.song_id.to_string());
            entry.set_attribute("chart", song.chart.to_string());
            entry.set_attribute("plays", song.plays.to_string());
            favorites.add_child(entry);
        }

        let mut root = Node::void("game");
        root.add_child(scores);
        root.add_child(favorites);
        Ok(Some(root))
    })
}
