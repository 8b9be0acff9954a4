use std::fs;

use predicates::prelude::*;
use serde_json::{Value, json};

mod http_stub;
use http_stub::{HttpStub, Route};

fn article(title: &str) -> Value {
    json!({"title": title, "slug": title.to_lowercase().replace(' ', "-"), "content": "<p>x</p>"})
}

fn read_json(path: &std::path::Path) -> anyhow::Result<Value> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

#[test]
fn downloads_every_listed_article_with_bounded_workers() -> anyhow::Result<()> {
    let stub = HttpStub::spawn([
        (
            "/api/articles",
            Route::json(json!([
                "arrays/two-sum",
                {"post_link": "https://site.example/strings/reverse-words/"},
                {"path": "graphs/bfs"}
            ])),
        ),
        ("/api/article/arrays/two-sum", Route::json(article("Two Sum"))),
        ("/api/article/strings/reverse-words", Route::json(article("Reverse Words"))),
        ("/api/article/graphs/bfs", Route::json(article("BFS"))),
    ]);
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("articles");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("articlepress");
    cmd.args(["download", "--workers", "2", "--api-base"])
        .arg(stub.url("/api"))
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("download: 3 succeeded, 0 failed"));

    assert_eq!(read_json(&out.join("arrays/two-sum.json"))?, article("Two Sum"));
    assert_eq!(
        read_json(&out.join("strings/reverse-words.json"))?,
        article("Reverse Words")
    );
    assert_eq!(read_json(&out.join("graphs/bfs.json"))?, article("BFS"));

    let pretty = fs::read_to_string(out.join("graphs/bfs.json"))?;
    assert!(pretty.contains("\n  \"title\": \"BFS\""), "{pretty}");
    Ok(())
}

#[test]
fn failed_articles_are_reported_without_aborting() -> anyhow::Result<()> {
    let stub = HttpStub::spawn([
        (
            "/api/articles",
            Route::json(json!({"data": [
                "arrays/two-sum",
                "arrays/gone",
                "https://site.example/",
                "mailto:someone@example.com"
            ]})),
        ),
        ("/api/article/arrays/two-sum", Route::json(article("Two Sum"))),
    ]);
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("articles");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("articlepress");
    cmd.args(["download", "--api-base"])
        .arg(stub.url("/api"))
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("download: 1 succeeded, 3 failed"))
        .stdout(predicate::str::contains("failed [network]"))
        .stdout(predicate::str::contains("/api/article/arrays/gone"))
        .stdout(predicate::str::contains("failed [parse] https://site.example/"))
        .stdout(predicate::str::contains("failed [parse] mailto:someone@example.com"));

    assert!(out.join("arrays/two-sum.json").is_file());
    assert!(!out.join("arrays/gone.json").exists());
    assert_eq!(stub.hits("/api/article/arrays/gone"), 1, "404 is not retried");
    Ok(())
}

#[test]
fn curriculum_links_and_skip_existing() -> anyhow::Result<()> {
    let stub = HttpStub::spawn([
        ("/api/article/arrays/two-sum", Route::json(article("Two Sum"))),
        ("/api/article/arrays/three-sum", Route::json(article("Three Sum"))),
    ]);
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("articles");
    fs::create_dir_all(out.join("arrays"))?;
    fs::write(out.join("arrays/two-sum.json"), "{\"kept\": true}")?;

    let curriculum = temp.path().join("a2z.json");
    fs::write(
        &curriculum,
        json!([{
            "step_title": "Arrays",
            "sub_steps": [{"topics": [
                {"id": 1, "post_link": "https://site.example/arrays/two-sum"},
                {"id": 2, "post_link": "https://site.example/arrays/three-sum"},
                {"id": 3, "post_link": null}
            ]}]
        }])
        .to_string(),
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("articlepress");
    cmd.args(["download", "--skip-existing", "--api-base"])
        .arg(stub.url("/api"))
        .arg("--curriculum")
        .arg(&curriculum)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("download: 1 succeeded, 0 failed, 1 skipped"));

    assert_eq!(
        fs::read_to_string(out.join("arrays/two-sum.json"))?,
        "{\"kept\": true}"
    );
    assert_eq!(stub.hits("/api/article/arrays/two-sum"), 0);
    assert_eq!(read_json(&out.join("arrays/three-sum.json"))?, article("Three Sum"));
    Ok(())
}

#[test]
fn unreachable_list_endpoint_is_fatal() {
    let stub = HttpStub::spawn([("/api/articles", Route::status(404))]);

    let temp = tempfile::TempDir::new().expect("tempdir");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("articlepress");
    cmd.args(["download", "--api-base"])
        .arg(stub.url("/api"))
        .arg("--out")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("fetch article list"));
}
