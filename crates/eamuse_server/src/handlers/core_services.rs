//! Boot-time services every cabinet calls regardless of game.

use crate::handler::{GameHandler, MethodFuture, MethodTable};
use anyhow::{anyhow, Context};
use eamuse_data::ValidatedDict;
use eamuse_protocol::Node;
use std::net::{IpAddr, Ipv4Addr};

/// Services answered by this server, advertised in `services.get`.
pub const CORE_SERVICES: [&str; 12] = [
    "cardmng",
    "dlstatus",
    "eacoin",
    "facility",
    "lobby",
    "local",
    "message",
    "package",
    "pcbevent",
    "pcbtracker",
    "pkglist",
    "posevent",
];

/// Adds the core service entries to `table`.
pub fn register<G: GameHandler>(table: MethodTable<G>) -> MethodTable<G> {
    table
        .method("services", "get", services_get::<G>)
        .method("pcbtracker", "alive", pcbtracker_alive::<G>)
        .method("pcbevent", "put", pcbevent_put::<G>)
        .method("package", "list", package_list::<G>)
        .method("message", "get", message_get::<G>)
        .method("dlstatus", "progress", dlstatus_progress::<G>)
        .method("facility", "get", facility_get::<G>)
}

fn item(name: &str, url: &str) -> Node {
    let mut node = Node::void("item");
    node.set_attribute("name", name);
    node.set_attribute("url", url);
    node
}

async fn resolve_ipv4(host: &str) -> anyhow::Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .with_context(|| format!("resolving {host}"))?;
    addrs
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| anyhow!("no IPv4 address for {host}"))
}

/// Tells the cabinet where each service lives. Everything lives here.
pub fn services_get<'a, G: GameHandler>(game: &'a G, _request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let config = game.base().config();
        let url = config.url();

        let mut root = Node::void("services");
        root.set_attribute("expire", "600");
        // operation, debug, test or factory
        root.set_attribute("mode", "operation");
        root.set_attribute("product_domain", "1");

        for service in CORE_SERVICES {
            root.add_child(item(service, &url));
        }
        for service in game.extra_services() {
            root.add_child(item(&service, &url));
        }
        root.add_child(item("ntp", "ntp://pool.ntp.org/"));

        // keepalive wants a raw address, not a host name
        let keepalive = resolve_ipv4(&config.server.host).await?;
        root.add_child(item(
            "keepalive",
            &format!(
                "http://{keepalive}/core/keepalive?pa={keepalive}&ia={keepalive}&ga={keepalive}&ma={keepalive}&t1=2&t2=10"
            ),
        ));
        Ok(Some(root))
    })
}

/// Boot heartbeat. `ecenable` switches PASELI on or off for the session, and
/// stays off unless this request's PASELI switch is on.
pub fn pcbtracker_alive<'a, G: GameHandler>(game: &'a G, _request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let enabled = game.supports_paseli() && game.base().config().paseli.enabled;
        let mut root = Node::void("pcbtracker");
        root.set_attribute("ecenable", if enabled { "1" } else { "0" });
        root.set_attribute("expire", "600");
        Ok(Some(root))
    })
}

/// Cabinet-side event reports. Each `item` is stored as a `pcbevent`.
pub fn pcbevent_put<'a, G: GameHandler>(game: &'a G, request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let config = base.config();

        for entry in request.children().iter().filter(|c| c.name() == "item") {
            let mut body = ValidatedDict::new();
            body.replace_str("name", entry.child_str("name").unwrap_or_default());
            body.replace_str(
                "value",
                entry.child_value("value").map(|v| v.to_string()).unwrap_or_default(),
            );
            body.replace_str("model", base.model().to_string());
            body.replace_str("pcbid", config.pcbid().unwrap_or_default());
            body.replace_str("ip", config.client_address().unwrap_or_default());

            base.data()
                .network()
                .put_event("pcbevent", &body, entry.child_int("time"))
                .await?;
        }
        Ok(Some(Node::void("pcbevent")))
    })
}

/// Update packages. None are offered.
pub fn package_list<'a, G: GameHandler>(_game: &'a G, _request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let mut root = Node::void("package");
        root.set_attribute("expire", "600");
        Ok(Some(root))
    })
}

/// Operator messages. None are sent.
pub fn message_get<'a, G: GameHandler>(_game: &'a G, _request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let mut root = Node::void("message");
        root.set_attribute("expire", "600");
        Ok(Some(root))
    })
}

pub fn dlstatus_progress<'a, G: GameHandler>(_game: &'a G, _request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move { Ok(Some(Node::void("dlstatus"))) })
}

/// Location, network and branding details for the requesting cabinet.
pub fn facility_get<'a, G: GameHandler>(game: &'a G, _request: &'a Node) -> MethodFuture<'a> {
    Box::pin(async move {
        let base = game.base();
        let config = base.config();
        let pcbid = config
            .pcbid()
            .ok_or_else(|| anyhow!("facility.get without a machine"))?;
        let machine = base
            .data()
            .machine()
            .get_machine(pcbid)
            .await?
            .ok_or_else(|| anyhow!("machine {pcbid} vanished"))?;

        let mut location = Node::void("location");
        location.add_child(Node::string("id", format!("US-{}", machine.id)));
        location.add_child(Node::string("country", "US"));
        location.add_child(Node::string("region", "."));
        location.add_child(Node::string("name", machine.name.as_str()));
        location.add_child(Node::u8("type", 0));

        let mut line = Node::void("line");
        line.add_child(Node::string("id", "."));
        line.add_child(Node::u8("class", 0));

        let global_ip = config
            .client_address()
            .and_then(|a| a.parse::<Ipv4Addr>().ok())
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        let mut portfw = Node::void("portfw");
        portfw.add_child(Node::ipv4("globalip", global_ip));
        portfw.add_child(Node::u16("globalport", machine.port));
        portfw.add_child(Node::u16("privateport", machine.port));

        let mut public = Node::void("public");
        public.add_child(Node::u8("flag", 1));
        public.add_child(Node::string("name", "."));
        public.add_child(Node::string("latitude", "0"));
        public.add_child(Node::string("longitude", "0"));

        let mut eacoin = Node::void("eacoin");
        eacoin.add_child(Node::s32("notchamount", 3000));
        eacoin.add_child(Node::s32("notchcount", 3));
        eacoin.add_child(Node::s32("supplylimit", 10000));

        let mut eapass = Node::void("eapass");
        eapass.add_child(Node::u16("valid", 365));

        let title = format!("{} {}", config.app.name, config.app.version);
        let mut url = Node::void("url");
        for name in ["eapass", "arcadefan", "konaminetdx", "konamiid", "eagate"] {
            url.add_child(Node::string(name, title.as_str()));
        }

        let mut share = Node::void("share");
        share.add_child(eacoin);
        share.add_child(url);
        share.add_child(eapass);

        let mut root = Node::void("facility");
        root.set_attribute("expire", "600");
        root.add_child(location);
        root.add_child(line);
        root.add_child(portfw);
        root.add_child(public);
        root.add_child(share);
        Ok(Some(root))
    })
}
