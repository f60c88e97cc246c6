use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use offreg_config::config::LatestPolicy;
use offreg_core::{DirectoryBackend, Registry, TarballBackend};
use offreg_server::{Service, ServiceConfig};

struct Reply {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .proxy(None)
        .build()
        .into()
}

async fn request(method: &'static str, url: String) -> Reply {
    tokio::task::spawn_blocking(move || {
        let agent = agent();
        let response = match method {
            "HEAD" => agent.head(&url).call(),
            "POST" => agent.post(&url).send_empty(),
            _ => agent.get(&url).call(),
        }
        .unwrap();

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.into_body().read_to_vec().unwrap();

        Reply {
            status,
            content_type,
            body,
        }
    })
    .await
    .unwrap()
}

async fn get(url: String) -> Reply {
    request("GET", url).await
}

fn npm_pack(path: &Path, manifest: &str) {
    let encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in [
        ("package/package.json", manifest),
        ("package/index.js", "module.exports = 1;"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn source_dir(root: &Path, dir: &str, manifest: &str) -> PathBuf {
    let path = root.join(dir);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("package.json"), manifest).unwrap();
    fs::write(path.join("index.js"), "module.exports = 2;").unwrap();
    path
}

fn unpacked_manifest(bytes: &[u8]) -> serde_json::Value {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap() == Path::new("package/package.json") {
            let mut json = String::new();
            entry.read_to_string(&mut json).unwrap();
            return serde_json::from_str(&json).unwrap();
        }
    }
    panic!("archive has no package/package.json");
}

/// Registers `paths` and starts a service on an ephemeral port.
async fn serve(paths: &[&Path]) -> (Service, String) {
    let mut registry = Registry::new(LatestPolicy::Highest);
    registry.add_backend(Arc::new(TarballBackend));
    registry.add_backend(Arc::new(DirectoryBackend));
    for path in paths {
        registry.register(path).await.unwrap();
    }

    let service = Service::new(ServiceConfig {
        host: "127.0.0.1".into(),
        port: 0,
    });
    let binding = service.run(Arc::new(registry)).await.unwrap();
    (service, binding.url.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_tarball_file_verbatim() {
    let tmp = tempfile::tempdir().unwrap();
    let tgz = tmp.path().join("pkg-1.0.0.tgz");
    npm_pack(&tgz, r#"{"name":"pkg","version":"1.0.0"}"#);

    let (service, base) = serve(&[tgz.as_path()]).await;

    let reply = get(format!("{base}pkg")).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    let doc = reply.json();
    assert_eq!(doc["name"], "pkg");
    assert_eq!(doc["dist-tags"]["latest"], "1.0.0");
    let tarball_url = doc["versions"]["1.0.0"]["dist"]["tarball"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(tarball_url, format!("{base}pkg/-/pkg-1.0.0.tgz"));

    let reply = get(tarball_url).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(reply.body, fs::read(&tgz).unwrap());

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_directory_as_packed_tarball() {
    let tmp = tempfile::tempdir().unwrap();
    let src = source_dir(
        tmp.path(),
        "pkg-src",
        r#"{"name":"pkg","version":"2.0.0","main":"index.js"}"#,
    );

    let (service, base) = serve(&[src.as_path()]).await;

    let doc = get(format!("{base}pkg")).await.json();
    assert_eq!(doc["versions"]["2.0.0"]["main"], "index.js");

    let reply = get(format!("{base}pkg/-/pkg-2.0.0.tgz")).await;
    assert_eq!(reply.status, 200);
    let manifest = unpacked_manifest(&reply.body);
    let original: serde_json::Value =
        serde_json::from_slice(&fs::read(src.join("package.json")).unwrap()).unwrap();
    assert_eq!(manifest, original);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_packages_are_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let readme = tmp.path().join("README.md");
    fs::write(&readme, "# notes").unwrap();
    let src = source_dir(tmp.path(), "pkg", r#"{"name":"pkg","version":"1.0.0"}"#);

    let (service, base) = serve(&[readme.as_path(), src.as_path()]).await;

    assert_eq!(get(format!("{base}README.md")).await.status, 404);
    assert_eq!(get(format!("{base}unknown")).await.status, 404);
    assert_eq!(get(format!("{base}pkg/-/pkg-9.9.9.tgz")).await.status, 404);
    assert_eq!(get(format!("{base}unknown/-/unknown-1.0.0.tgz")).await.status, 404);
    assert_eq!(get(base.clone()).await.status, 404);
    assert_eq!(request("POST", format!("{base}pkg")).await.status, 404);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn scoped_packages_under_both_encodings() {
    let tmp = tempfile::tempdir().unwrap();
    let src = source_dir(
        tmp.path(),
        "scoped",
        r#"{"name":"@scope/pkg","version":"0.1.0"}"#,
    );

    let (service, base) = serve(&[src.as_path()]).await;

    for path in ["@scope/pkg", "@scope%2fpkg", "@scope%2Fpkg"] {
        let reply = get(format!("{base}{path}")).await;
        assert_eq!(reply.status, 200, "{path}");
        assert_eq!(reply.json()["name"], "@scope/pkg");
    }

    let doc = get(format!("{base}@scope%2fpkg")).await.json();
    let tarball_url = doc["versions"]["0.1.0"]["dist"]["tarball"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(tarball_url, format!("{base}@scope/pkg/-/pkg-0.1.0.tgz"));

    let reply = get(tarball_url).await;
    assert_eq!(reply.status, 200);
    assert_eq!(unpacked_manifest(&reply.body)["name"], "@scope/pkg");

    let reply = get(format!("{base}@scope%2fpkg/-/pkg-0.1.0.tgz")).await;
    assert_eq!(reply.status, 200);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn head_requests_have_no_body() {
    let tmp = tempfile::tempdir().unwrap();
    let tgz = tmp.path().join("pkg-1.0.0.tgz");
    npm_pack(&tgz, r#"{"name":"pkg","version":"1.0.0"}"#);

    let (service, base) = serve(&[tgz.as_path()]).await;

    let reply = request("HEAD", format!("{base}pkg")).await;
    assert_eq!(reply.status, 200);
    assert!(reply.body.is_empty());

    let reply = request("HEAD", format!("{base}pkg/-/pkg-1.0.0.tgz")).await;
    assert_eq!(reply.status, 200);
    assert!(reply.body.is_empty());

    assert_eq!(request("HEAD", format!("{base}nope")).await.status, 404);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent_and_closes_listener() {
    let (service, base) = serve(&[]).await;
    assert_eq!(service.url().map(|url| url.to_string()), Some(base.clone()));

    service.stop().await.unwrap();
    service.stop().await.unwrap();
    assert!(service.url().is_none());

    let refused = tokio::task::spawn_blocking(move || agent().get(&base).call().is_err())
        .await
        .unwrap();
    assert!(refused);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_download_leaves_service_running() {
    let tmp = tempfile::tempdir().unwrap();
    let src = source_dir(tmp.path(), "pkg-src", r#"{"name":"pkg","version":"2.0.0"}"#);

    let (service, base) = serve(&[src.as_path()]).await;
    fs::remove_dir_all(&src).unwrap();

    let url = format!("{base}pkg/-/pkg-2.0.0.tgz");
    let download = tokio::task::spawn_blocking(move || {
        agent()
            .get(&url)
            .call()
            .and_then(|response| response.into_body().read_to_vec())
    })
    .await
    .unwrap();
    assert!(download.is_err());

    let reply = get(format!("{base}pkg")).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()["dist-tags"]["latest"], "2.0.0");

    service.stop().await.unwrap();
}
