//! Card management: card lookup, PIN checks, registration and binding.

use crate::handler::{status, GameHandler, MethodFuture, MethodTable};
use crate::model::Model;
use eamuse_protocol::Node;
use tracing::debug;

/// Adds the service-wide `cardmng` entry to `table`.
pub fn register<G: GameHandler>(table: MethodTable<G>) -> MethodTable<G> {
    table.service("cardmng", cardmng::<G>)
}

fn with_status(code: u32) -> Node {
    let mut root = Node::void("cardmng");
    root.set_attribute("status", code.to_string());
    root
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Handles every `cardmng` method.
///
/// The reference id doubles as the data id in this backend.
pub fn cardmng<'a, G: GameHandler>(game: &'a G, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let users = base.data().user();
        let attr = |key: &str| request.attribute(key).unwrap_or_default();

        let response = match request.attribute("method").unwrap_or_default() {
            "inquire" => {
                let Some(userid) = users.from_cardid(attr("cardid")).await? else {
                    return Ok(Some(with_status(status::NOT_REGISTERED)));
                };

                let mut bound = game.has_profile(userid).await?;
                let mut expired = false;
                if !bound {
                    // an older version's profile can be carried forward
                    if let Some(model) = request.attribute("model").and_then(|m| m.parse::<Model>().ok()) {
                        let previous =
                            base.registry()
                                .resolve(base.context().clone(), &model, Some(base.model()));
                        if let Some(previous) = previous {
                            bound = previous.has_profile(userid).await?;
                            expired = true;
                        }
                    }
                }

                let refid = users.get_refid(base.game(), base.version(), userid).await?;
                let mut root = Node::void("cardmng");
                root.set_attribute("refid", refid.as_str());
                root.set_attribute("dataid", refid.as_str());
                root.set_attribute("newflag", "1");
                root.set_attribute("binded", flag(bound));
                root.set_attribute("expired", flag(expired));
                root.set_attribute("ecflag", flag(game.supports_paseli()));
                root.set_attribute("useridflag", "1");
                root.set_attribute("extidflag", "1");
                root
            }
            "authpass" => {
                let valid = match users
                    .from_refid(base.game(), base.version(), attr("refid"))
                    .await?
                {
                    Some(userid) => users.validate_pin(userid, attr("pass")).await?,
                    None => false,
                };
                with_status(if valid {
                    status::SUCCESS
                } else {
                    status::INVALID_PIN
                })
            }
            "getrefid" => {
                let Some(userid) = users.create_account(attr("cardid"), attr("passwd")).await? else {
                    return Ok(Some(with_status(status::NOT_ALLOWED)));
                };
                let refid = users.create_refid(base.game(), base.version(), userid).await?;
                let mut root = Node::void("cardmng");
                root.set_attribute("dataid", refid.as_str());
                root.set_attribute("refid", refid.as_str());
                root
            }
            "bindmodel" => {
                let refid = attr("refid");
                if let Some(userid) = users.from_refid(base.game(), base.version(), refid).await? {
                    game.bind_profile(userid).await?;
                }
                let mut root = Node::void("cardmng");
                root.set_attribute("dataid", refid);
                root
            }
            "getkeepspan" => {
                let mut root = Node::void("cardmng");
                root.set_attribute("keepspan", "30");
                root
            }
            "getdatalist" => Node::void("cardmng"),
            other => {
                debug!("Unknown cardmng method {}", other);
                return Ok(None);
            }
        };
        Ok(Some(response))
    })
}
