//! Show where a request would go: which mount, which provider path,
//! which lock path, and whether the account may do it. Then run it.
use std::error::Error;

use clap::Parser;

use davgate::account::{DavAccount, Permission};
use davgate::memfs::MemFs;
use davgate::{DavConfig, DavMethod, DavMount, DavRequest};

#[derive(Debug, clap::Parser)]
#[clap(about, version)]
struct Cli {
    /// mount an in-memory provider, as PREFIX[:home][:ro]
    #[clap(short = 'm', long = "mount", default_value = "/")]
    mounts: Vec<String>,
    /// account name
    #[clap(short = 'u', long, default_value = "guest")]
    user: String,
    /// permission rule, +PREFIX or -PREFIX (default +/)
    #[clap(short = 'r', long = "rule", allow_hyphen_values = true)]
    rules: Vec<String>,
    /// allow COPY and MOVE between mounts
    #[clap(short = 'x', long)]
    cross_provider: bool,
    /// request method
    #[clap(short = 'X', long, default_value = "GET")]
    method: String,
    /// destination, for COPY and MOVE
    #[clap(short = 'd', long)]
    destination: Option<String>,
    /// request path
    path: String,
}

fn parse_mount(arg: &str) -> Result<DavMount, String> {
    let mut parts = arg.split(':');
    let prefix = parts.next().unwrap_or_default();
    let mut mount = DavMount::new(prefix, format!("memory://{}", prefix), MemFs::new());
    for flag in parts {
        mount = match flag {
            "home" => mount.home_dir(true),
            "ro" => mount.readonly(true),
            _ => return Err(format!("{}: unknown mount flag {:?}", arg, flag)),
        };
    }
    Ok(mount)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();

    let rules = if args.rules.is_empty() {
        vec!["+/".to_string()]
    } else {
        args.rules.clone()
    };
    let account = DavAccount::new(args.user.as_str(), rules)?;

    let mut config = DavConfig::new()
        .default_account(account.clone())
        .cross_provider(args.cross_provider);
    for m in &args.mounts {
        config = config.mount(parse_mount(m)?);
    }
    let dav = config.build_handler()?;

    let method = http::Method::from_bytes(args.method.to_uppercase().as_bytes())?;
    let method = DavMethod::try_from(&method)?;
    let mut req = DavRequest::new(method, args.path.as_str());
    if let Some(dest) = args.destination.as_deref() {
        req = req.destination(dest);
    }

    let passport = dav.passport(&req, &account)?;
    let routes = std::iter::once(("source", &passport.src)).chain(passport.dst.iter().map(|d| ("destination", d)));
    for (what, route) in routes {
        println!("{}:", what);
        println!("  path:      {}", route.path);
        println!("  mount:     {} ({})", route.mount.prefix(), route.mount.uri());
        println!("  prefix:    {}", route.prefix);
        println!("  rel_path:  {}", route.rel_path);
        println!("  lock_path: {}", route.lock_path);
        if route.mount.is_readonly() {
            println!("  readonly");
        }
        let write = method.is_write() && !(method == DavMethod::Copy && what == "source");
        let verdict = match account.resolve(&route.path, write) {
            Permission::Allowed => "allowed",
            Permission::Denied => "denied",
        };
        println!("  {} {}: {}", account.username(), method, verdict);
    }

    // and what the distributor makes of it, on empty in-memory mounts.
    match dav.handle(&req, &account).await {
        Ok(resp) => println!("result: {}", resp.status()),
        Err(err) => println!("result: {} ({})", err.statuscode(), err),
    }
    Ok(())
}
