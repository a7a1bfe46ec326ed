#![cfg(feature = "memfs")]

use std::time::Duration;

use davgate::account::{DavAccount, MemAccounts};
use davgate::davpath::DavPath;
use davgate::fs::PropIdentity;
use davgate::ls::LockScope;
use davgate::memfs::MemFs;
use davgate::props::{BasicProp, PropPatch, PropRequest};
use davgate::{DavConfig, DavError, DavMethod, DavMethodSet, DavMount, DavRequest, DavResponse, Depth, Distributor};
use http::StatusCode;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn p(s: &str) -> DavPath {
    DavPath::new(s).unwrap()
}

fn alice() -> DavAccount {
    DavAccount::new("alice", ["+/", "-/private"]).unwrap()
}

fn bob() -> DavAccount {
    DavAccount::new("bob", ["+/"]).unwrap()
}

fn setup(config: DavConfig) -> Distributor {
    init_log();
    config
        .mount(DavMount::new("/", "memory:///root", MemFs::new()))
        .mount(DavMount::new("/docs", "memory:///docs", MemFs::new()))
        .mount(DavMount::new("/ro", "memory:///ro", MemFs::new()).readonly(true))
        .mount(DavMount::new("/~", "memory:///home", MemFs::new()).home_dir(true))
        .accounts(MemAccounts::new([alice(), bob()]))
        .build_handler()
        .unwrap()
}

fn server() -> Distributor {
    setup(DavConfig::new())
}

async fn mkcol(dav: &Distributor, acct: &DavAccount, path: &str) {
    let resp = dav.handle(&DavRequest::new(DavMethod::MkCol, path), acct).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

async fn put(dav: &Distributor, acct: &DavAccount, path: &str, data: &'static str) -> DavResponse {
    let req = DavRequest::new(DavMethod::Put, path).body(data);
    dav.handle(&req, acct).await.unwrap()
}

async fn get(dav: &Distributor, acct: &DavAccount, path: &str) -> Result<String, DavError> {
    match dav.handle(&DavRequest::new(DavMethod::Get, path), acct).await? {
        DavResponse::Content { body: Some(body), .. } => Ok(String::from_utf8(body.to_vec()).unwrap()),
        other => panic!("unexpected response {:?}", other),
    }
}

async fn lock(dav: &Distributor, acct: &DavAccount, path: &str, scope: LockScope, depth: Depth) -> DavResult {
    let req = DavRequest::new(DavMethod::Lock, path)
        .lock_info(scope, acct.username())
        .depth(depth)
        .timeout(Duration::from_secs(60));
    dav.handle(&req, acct).await
}

type DavResult = Result<DavResponse, DavError>;

fn token(resp: DavResponse) -> String {
    match resp {
        DavResponse::LockGranted { lock, .. } => lock.token,
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_longest_prefix() {
    let dav = server();
    put(&dav, &alice(), "/docs/a.txt", "docs").await;
    put(&dav, &alice(), "/a.txt", "root").await;
    assert_eq!(get(&dav, &alice(), "/docs/a.txt").await.unwrap(), "docs");
    assert_eq!(get(&dav, &alice(), "/a.txt").await.unwrap(), "root");

    let req = DavRequest::new(DavMethod::Get, "/docs/a.txt");
    let passport = dav.passport(&req, &alice()).unwrap();
    assert_eq!(passport.src.mount.uri(), "memory:///docs");
    assert_eq!(passport.src.rel_path, p("/a.txt"));
    assert_eq!(passport.src_prefix(), &p("/docs"));
}

#[tokio::test]
async fn test_home_dir() {
    let dav = server();
    mkcol(&dav, &alice(), "/~").await;
    let resp = put(&dav, &alice(), "/~/foo", "mine").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(get(&dav, &alice(), "/~/foo").await.unwrap(), "mine");

    // bob has a home of his own.
    let err = get(&dav, &bob(), "/~/foo").await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::NOT_FOUND);

    let resp = lock(&dav, &alice(), "/~/foo", LockScope::Exclusive, Depth::Zero).await.unwrap();
    match resp {
        DavResponse::LockGranted { lock, created } => {
            assert!(!created);
            assert_eq!(lock.path, p("/~/alice/foo"));
        },
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_readonly_mount() {
    let dav = server();
    let req = DavRequest::new(DavMethod::Put, "/ro/x").body("x");
    assert!(matches!(dav.handle(&req, &alice()).await, Err(DavError::ReadOnly)));

    let resp = dav.handle(&DavRequest::new(DavMethod::Options, "/ro"), &alice()).await.unwrap();
    match resp {
        DavResponse::Options(allowed) => {
            assert!(allowed.contains(DavMethod::PropFind));
            assert!(!allowed.contains(DavMethod::Put));
            assert!(!allowed.contains(DavMethod::Delete));
        },
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_lock_blocks_write() {
    let dav = server();
    mkcol(&dav, &alice(), "/a").await;
    mkcol(&dav, &alice(), "/a/b").await;

    let resp = lock(&dav, &alice(), "/a/b", LockScope::Exclusive, Depth::Infinity).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("lock-token"));
    let token = token(resp);

    let req = DavRequest::new(DavMethod::Put, "/a/b/c").body("c");
    let err = dav.handle(&req, &alice()).await.unwrap_err();
    assert!(matches!(err, DavError::Locked(_)));
    assert_eq!(err.statuscode(), StatusCode::LOCKED);

    let req = req.if_token(token.as_str());
    let resp = dav.handle(&req, &alice()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // the parent is not covered.
    let resp = put(&dav, &alice(), "/a/c", "c").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_shared_locks() {
    let dav = server();
    put(&dav, &alice(), "/f", "f").await;

    let t1 = token(lock(&dav, &alice(), "/f", LockScope::Shared, Depth::Zero).await.unwrap());
    let t2 = token(lock(&dav, &bob(), "/f", LockScope::Shared, Depth::Zero).await.unwrap());
    assert_ne!(t1, t2);
    assert_eq!(dav.locksystem().discover(&p("/f")).len(), 2);

    let err = lock(&dav, &alice(), "/f", LockScope::Exclusive, Depth::Zero).await.unwrap_err();
    assert!(matches!(err, DavError::Conflict(_)));
    assert_eq!(err.statuscode(), StatusCode::LOCKED);

    // any one of the shared tokens will do.
    let req = DavRequest::new(DavMethod::Put, "/f").body("g").if_token(t2.as_str());
    assert_eq!(dav.handle(&req, &bob()).await.unwrap().status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_lock_creates_resource() {
    let dav = server();
    let resp = lock(&dav, &alice(), "/new", LockScope::Exclusive, Depth::Zero).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(get(&dav, &alice(), "/new").await.unwrap(), "");

    // no parent, no lock.
    let err = lock(&dav, &alice(), "/nodir/new", LockScope::Exclusive, Depth::Zero)
        .await
        .unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::CONFLICT);
    assert!(dav.locksystem().discover(&p("/nodir/new")).is_empty());
}

#[tokio::test]
async fn test_lock_refresh() {
    let dav = server();
    put(&dav, &alice(), "/f", "f").await;
    let token = token(lock(&dav, &alice(), "/f", LockScope::Exclusive, Depth::Zero).await.unwrap());

    let req = DavRequest::new(DavMethod::Lock, "/f")
        .if_token(token.as_str())
        .timeout(Duration::from_secs(3600));
    match dav.handle(&req, &alice()).await.unwrap() {
        DavResponse::LockRefreshed(lock) => {
            assert_eq!(lock.token, token);
            assert_eq!(lock.timeout, Duration::from_secs(600));
        },
        other => panic!("unexpected response {:?}", other),
    }

    let req = DavRequest::new(DavMethod::Lock, "/f").if_token("opaquelocktoken:nope");
    let err = dav.handle(&req, &alice()).await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_unlock() {
    let dav = server();
    put(&dav, &alice(), "/f", "f").await;
    let token = token(lock(&dav, &alice(), "/f", LockScope::Exclusive, Depth::Zero).await.unwrap());

    let req = DavRequest::new(DavMethod::Unlock, "/f").lock_token(token.as_str());
    assert!(matches!(dav.handle(&req, &bob()).await, Err(DavError::Denied)));

    let admin = bob().admin(true);
    let resp = dav.handle(&req, &admin).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    assert!(matches!(dav.handle(&req, &alice()).await, Err(DavError::NoSuchLock)));
}

#[tokio::test]
async fn test_delete_clears_locks() {
    let dav = server();
    mkcol(&dav, &alice(), "/d").await;
    put(&dav, &alice(), "/d/f", "f").await;
    let token = token(lock(&dav, &alice(), "/d/f", LockScope::Exclusive, Depth::Zero).await.unwrap());

    // a lock below the collection blocks the delete.
    let req = DavRequest::new(DavMethod::Delete, "/d");
    assert!(matches!(dav.handle(&req, &alice()).await, Err(DavError::Locked(_))));

    let req = req.if_token(token.as_str());
    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert!(dav.locksystem().discover(&p("/d/f")).is_empty());
    assert_eq!(
        get(&dav, &alice(), "/d/f").await.unwrap_err().statuscode(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_move_clears_locks() {
    let dav = server();
    put(&dav, &alice(), "/f", "data").await;
    let token = token(lock(&dav, &alice(), "/f", LockScope::Exclusive, Depth::Zero).await.unwrap());

    let req = DavRequest::new(DavMethod::Move, "/f").destination("http://host/g");
    assert!(matches!(dav.handle(&req, &alice()).await, Err(DavError::Locked(_))));

    let req = req.if_token(token.as_str());
    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::CREATED);
    assert!(dav.locksystem().discover(&p("/f")).is_empty());
    assert!(dav.locksystem().discover(&p("/g")).is_empty());
    assert_eq!(get(&dav, &alice(), "/g").await.unwrap(), "data");
}

#[tokio::test]
async fn test_copy_overwrite() {
    let dav = server();
    put(&dav, &alice(), "/f", "one").await;
    put(&dav, &alice(), "/g", "two").await;

    let req = DavRequest::new(DavMethod::Copy, "/f").destination("/g").overwrite(false);
    let err = dav.handle(&req, &alice()).await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::PRECONDITION_FAILED);

    let req = req.overwrite(true);
    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(get(&dav, &alice(), "/g").await.unwrap(), "one");
}

#[tokio::test]
async fn test_cross_provider() {
    let dav = server();
    put(&dav, &alice(), "/f", "data").await;
    let req = DavRequest::new(DavMethod::Copy, "/f").destination("/docs/f");
    assert!(matches!(
        dav.handle(&req, &alice()).await,
        Err(DavError::CrossProviderUnsupported)
    ));

    let dav = setup(DavConfig::new().cross_provider(true));
    put(&dav, &alice(), "/f", "data").await;
    let patch = DavRequest::new(DavMethod::PropPatch, "/f")
        .patch(PropPatch::set(PropIdentity::new("urn:x", "color"), "red"));
    dav.handle(&patch, &alice()).await.unwrap();

    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::CREATED);
    assert_eq!(get(&dav, &alice(), "/docs/f").await.unwrap(), "data");

    // dead properties travel along.
    let req = DavRequest::new(DavMethod::PropFind, "/docs/f").depth(Depth::Zero);
    match dav.handle(&req, &alice()).await.unwrap() {
        DavResponse::MultiStatus(props) => {
            assert_eq!(props[0].extra_data.get(&PropIdentity::new("urn:x", "color")).unwrap(), "red");
        },
        other => panic!("unexpected response {:?}", other),
    }

    let req = DavRequest::new(DavMethod::Move, "/f").destination("/docs/moved");
    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::CREATED);
    assert_eq!(
        get(&dav, &alice(), "/f").await.unwrap_err().statuscode(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_denied() {
    let dav = server();
    let err = get(&dav, &alice(), "/private/x").await.unwrap_err();
    assert!(matches!(err, DavError::Denied));
    assert_eq!(err.statuscode(), StatusCode::FORBIDDEN);

    // unknown and anonymous users have no account.
    assert!(matches!(dav.account(Some("mallory")), Err(DavError::Denied)));
    assert!(matches!(dav.account(None), Err(DavError::Denied)));
}

#[tokio::test]
async fn test_method_not_allowed() {
    let dav = setup(DavConfig::new().methods(DavMethodSet::read_only()));
    let req = DavRequest::new(DavMethod::Put, "/f").body("f");
    let err = dav.handle(&req, &alice()).await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = dav.handle(&DavRequest::new(DavMethod::PropFind, "/"), &alice()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
}

#[tokio::test]
async fn test_propfind() {
    let dav = server();
    mkcol(&dav, &alice(), "/c").await;
    put(&dav, &alice(), "/c/f", "abc").await;

    let missing = PropIdentity::new("urn:x", "missing");
    let req = DavRequest::new(DavMethod::PropFind, "/c/f")
        .depth(Depth::Zero)
        .propfind(PropRequest::Prop(vec![
            BasicProp::GetContentLength.identity(),
            missing.clone(),
        ]));
    match dav.handle(&req, &alice()).await.unwrap() {
        DavResponse::MultiStatus(props) => {
            assert_eq!(props.len(), 1);
            assert_eq!(props[0].basic_data.get(&BasicProp::GetContentLength).unwrap(), "3");
            assert_eq!(props[0].extra_not_found, vec![missing]);
        },
        other => panic!("unexpected response {:?}", other),
    }

    let req = DavRequest::new(DavMethod::PropFind, "/c").depth(Depth::One);
    match dav.handle(&req, &alice()).await.unwrap() {
        DavResponse::MultiStatus(props) => {
            let hrefs: Vec<_> = props.iter().map(|p| p.href()).collect();
            assert_eq!(hrefs, vec!["/c/", "/c/f"]);
        },
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_proppatch_partial_failure() {
    let dav = server();
    put(&dav, &alice(), "/f", "f").await;

    let color = PropIdentity::new("urn:x", "color");
    let etag = BasicProp::GetEtag.identity();
    let req = DavRequest::new(DavMethod::PropPatch, "/f")
        .patch(PropPatch::set(color.clone(), "red"))
        .patch(PropPatch::set(etag.clone(), "\"x\""));
    match dav.handle(&req, &alice()).await.unwrap() {
        DavResponse::PropPatch(res) => {
            assert!(!res.is_success());
            assert_eq!(res.status_of(&color), Some(StatusCode::OK));
            assert_eq!(res.status_of(&etag), Some(StatusCode::FORBIDDEN));
        },
        other => panic!("unexpected response {:?}", other),
    }

    let req = DavRequest::new(DavMethod::PropPatch, "/nothere").patch(PropPatch::remove(color));
    let err = dav.handle(&req, &alice()).await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patch_appends() {
    let dav = server();
    put(&dav, &alice(), "/log", "one").await;
    let req = DavRequest::new(DavMethod::Patch, "/log").body(",two");
    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(get(&dav, &alice(), "/log").await.unwrap(), "one,two");

    let req = DavRequest::new(DavMethod::Put, "/nodir/f").body("f");
    let err = dav.handle(&req, &alice()).await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::CONFLICT);
}

// bob fills /d, including a subtree carol may not see.
async fn secret_tree(dav: &Distributor) -> DavAccount {
    mkcol(dav, &bob(), "/d").await;
    mkcol(dav, &bob(), "/d/secret").await;
    put(dav, &bob(), "/d/secret/f", "classified").await;
    put(dav, &bob(), "/d/open", "open").await;
    DavAccount::new("carol", ["+/", "-/d/secret"]).unwrap()
}

#[tokio::test]
async fn test_denied_members_hidden() {
    let dav = server();
    let carol = secret_tree(&dav).await;
    assert!(matches!(get(&dav, &carol, "/d/secret/f").await, Err(DavError::Denied)));

    let req = DavRequest::new(DavMethod::PropFind, "/d");
    match dav.handle(&req, &carol).await.unwrap() {
        DavResponse::MultiStatus(props) => {
            let hrefs: Vec<_> = props.iter().map(|p| p.href()).collect();
            assert_eq!(hrefs, vec!["/d/", "/d/open"]);
        },
        other => panic!("unexpected response {:?}", other),
    }

    match dav.handle(&DavRequest::new(DavMethod::Get, "/d"), &carol).await.unwrap() {
        DavResponse::Listing { members, .. } => {
            let paths: Vec<_> = members.iter().map(|m| m.path.to_string()).collect();
            assert_eq!(paths, vec!["/d/open"]);
        },
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_denied_members_block_recursive_writes() {
    let dav = server();
    let carol = secret_tree(&dav).await;

    let req = DavRequest::new(DavMethod::Copy, "/d").destination("/e");
    assert!(matches!(dav.handle(&req, &carol).await, Err(DavError::Denied)));
    // nothing was copied.
    assert_eq!(get(&dav, &bob(), "/e/open").await.unwrap_err().statuscode(), StatusCode::NOT_FOUND);

    let req = DavRequest::new(DavMethod::Move, "/d").destination("/e");
    assert!(matches!(dav.handle(&req, &carol).await, Err(DavError::Denied)));

    let req = DavRequest::new(DavMethod::Delete, "/d");
    assert!(matches!(dav.handle(&req, &carol).await, Err(DavError::Denied)));
    assert_eq!(get(&dav, &bob(), "/d/secret/f").await.unwrap(), "classified");
    assert_eq!(get(&dav, &bob(), "/d/open").await.unwrap(), "open");

    // the collection alone is fine.
    let req = DavRequest::new(DavMethod::Copy, "/d").destination("/e").depth(Depth::Zero);
    assert_eq!(dav.handle(&req, &carol).await.unwrap().status(), StatusCode::CREATED);

    // copying into a denied subtree is refused as well.
    let dave = DavAccount::new("dave", ["+/", "-/x/secret"]).unwrap();
    let req = DavRequest::new(DavMethod::Copy, "/d").destination("/x");
    assert!(matches!(dav.handle(&req, &dave).await, Err(DavError::Denied)));
}

#[tokio::test]
async fn test_collection_lock_protects_members() {
    let dav = server();
    mkcol(&dav, &alice(), "/a").await;
    put(&dav, &alice(), "/a/x", "x").await;
    put(&dav, &bob(), "/f", "f").await;
    let token = token(lock(&dav, &alice(), "/a", LockScope::Exclusive, Depth::Zero).await.unwrap());

    let req = DavRequest::new(DavMethod::Put, "/a/new").body("new");
    assert!(matches!(dav.handle(&req, &bob()).await, Err(DavError::Locked(_))));
    let req = DavRequest::new(DavMethod::MkCol, "/a/c");
    assert!(matches!(dav.handle(&req, &bob()).await, Err(DavError::Locked(_))));
    let req = DavRequest::new(DavMethod::Delete, "/a/x");
    assert!(matches!(dav.handle(&req, &bob()).await, Err(DavError::Locked(_))));
    let req = DavRequest::new(DavMethod::Move, "/f").destination("/a/f");
    assert!(matches!(dav.handle(&req, &bob()).await, Err(DavError::Locked(_))));

    // the content of an existing member is not covered by a depth 0 lock.
    let resp = put(&dav, &bob(), "/a/x", "y").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = DavRequest::new(DavMethod::Put, "/a/new").body("new").if_token(token.as_str());
    assert_eq!(dav.handle(&req, &alice()).await.unwrap().status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_unlock_uses_lock_token_header() {
    let dav = server();
    put(&dav, &alice(), "/f", "f").await;
    put(&dav, &alice(), "/g", "g").await;
    let tf = token(lock(&dav, &alice(), "/f", LockScope::Exclusive, Depth::Zero).await.unwrap());
    let tg = token(lock(&dav, &alice(), "/g", LockScope::Exclusive, Depth::Zero).await.unwrap());

    let mut h = http::HeaderMap::new();
    h.insert("if", http::HeaderValue::from_str(&format!("(<{}>)", tg)).unwrap());
    h.insert("lock-token", http::HeaderValue::from_str(&format!("<{}>", tf)).unwrap());
    let method = http::Method::from_bytes(b"UNLOCK").unwrap();
    let req = DavRequest::from_http(&method, "/f", &h).unwrap();

    let resp = dav.handle(&req, &alice()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(dav.locksystem().discover(&p("/f")).is_empty());
    assert_eq!(dav.locksystem().discover(&p("/g")).len(), 1);
}

#[tokio::test]
async fn test_home_root_stays() {
    let dav = server();
    mkcol(&dav, &alice(), "/~").await;

    let err = dav.handle(&DavRequest::new(DavMethod::Delete, "/~"), &alice()).await.unwrap_err();
    assert_eq!(err.statuscode(), StatusCode::FORBIDDEN);

    match dav.handle(&DavRequest::new(DavMethod::Options, "/~"), &alice()).await.unwrap() {
        DavResponse::Options(allowed) => {
            assert!(allowed.contains(DavMethod::PropFind));
            assert!(!allowed.contains(DavMethod::Delete));
            assert!(!allowed.contains(DavMethod::Move));
        },
        other => panic!("unexpected response {:?}", other),
    }
}
