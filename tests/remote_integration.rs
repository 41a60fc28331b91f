//! Purpose: End-to-end tests for the HTTP/JSON lending server.
//! Exports: None (integration test module).
//! Role: Drive the loan lifecycle across TCP and check redirects, notices and views.
//! Invariants: Uses a loopback-only server started from the seed dataset.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use serde_json::{Value, json};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    agent: ureq::Agent,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start() -> TestResult<Self> {
        Self::start_with_args(&[])
    }

    fn start_with_args(extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_shelfkeep"))
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .args(extra)
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        agent: ureq::AgentBuilder::new().redirects(0).build(),
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn get(&self, path: &str) -> TestResult<Value> {
        let resp = self.agent.get(&format!("{}{path}", self.base_url)).call()?;
        assert_eq!(resp.status(), 200, "GET {path}");
        assert_eq!(resp.header("shelfkeep-api"), Some("0"));
        Ok(serde_json::from_str(&resp.into_string()?)?)
    }

    /// Returns the redirect target of a mutating request.
    fn post(&self, path: &str, body: Value) -> TestResult<String> {
        let resp = self
            .agent
            .post(&format!("{}{path}", self.base_url))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())?;
        Ok(expect_redirect(resp))
    }

    fn close(&self, loan_id: u64) -> TestResult<String> {
        let resp = self
            .agent
            .get(&format!("{}/prestamos/devolver/{loan_id}", self.base_url))
            .call()?;
        Ok(expect_redirect(resp))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn expect_redirect(resp: ureq::Response) -> String {
    assert_eq!(resp.status(), 303);
    resp.header("Location").unwrap_or_default().to_string()
}

fn notices(page: &Value) -> Vec<Value> {
    page["notices"].as_array().cloned().unwrap_or_default()
}

#[test]
fn seeded_views_and_health() -> TestResult<()> {
    let server = TestServer::start()?;

    let health = server.get("/healthz")?;
    assert_eq!(health["ok"], true);

    let index = server.get("/")?;
    assert_eq!(index["total_books"], 5);
    assert_eq!(index["available_books"], 5);
    assert_eq!(index["total_users"], 3);
    assert_eq!(index["active_loans"], 0);

    let books = server.get("/libros")?;
    assert_eq!(books["books"].as_array().map(Vec::len), Some(5));
    assert_eq!(books["available_ids"], json!([1, 2, 3, 4, 5]));

    let users = server.get("/usuarios")?;
    assert_eq!(users["users"][0]["name"], "Ash Ketchum");

    let form = server.get("/prestamos/realizar")?;
    assert_eq!(form["books"].as_array().map(Vec::len), Some(5));
    assert_eq!(form["users"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn loan_lifecycle_over_http() -> TestResult<()> {
    let server = TestServer::start()?;

    let target = server.post("/prestamos/realizar", json!({"user_id": 1, "book_id": 3}))?;
    assert_eq!(target, "/prestamos");
    let loans = server.get("/prestamos")?;
    let loan = &loans["loans"][0];
    assert_eq!(loan["id"], 1);
    assert_eq!(loan["book_title"], "Algoritmos Avanzados");
    assert_eq!(loan["user_name"], "Ash Ketchum");
    let shown = notices(&loans);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0]["kind"], "success");
    assert_eq!(shown[0]["details"]["loan_id"], 1);

    // Book 3 is out; a second borrower is refused and sent back to the form.
    let target = server.post("/prestamos/realizar", json!({"user_id": 2, "book_id": 3}))?;
    assert_eq!(target, "/prestamos/realizar");
    let form = server.get("/prestamos/realizar")?;
    let shown = notices(&form);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0]["kind"], "error");
    assert_eq!(shown[0]["message"], "book is not available");
    assert_eq!(shown[0]["details"]["active_loan_id"], 1);
    assert_eq!(shown[0]["details"]["held_by_user_id"], 1);
    assert_eq!(form["books"].as_array().map(Vec::len), Some(4));

    let stats = server.get("/estadisticas")?;
    assert_eq!(stats["available"], 4);
    assert_eq!(stats["borrowed"], 1);
    assert_eq!(stats["active_borrowers"], 1);
    assert_eq!(stats["active_loans"], 1);

    assert_eq!(server.close(1)?, "/prestamos");
    let loans = server.get("/prestamos")?;
    assert_eq!(loans["loans"], json!([]));
    assert_eq!(notices(&loans)[0]["kind"], "success");

    // Closing again is refused but still redirects.
    assert_eq!(server.close(1)?, "/prestamos");
    let loans = server.get("/prestamos")?;
    let shown = notices(&loans);
    assert_eq!(shown[0]["kind"], "error");
    assert_eq!(shown[0]["message"], "loan not found");

    let target = server.post("/prestamos/realizar", json!({"user_id": 2, "book_id": 3}))?;
    assert_eq!(target, "/prestamos");
    let loans = server.get("/prestamos")?;
    assert_eq!(loans["loans"][0]["id"], 2);

    let health = server.get("/healthz")?;
    assert_eq!(health["ok"], true);
    Ok(())
}

#[test]
fn additions_redirect_and_notify_once() -> TestResult<()> {
    let server = TestServer::start()?;

    let target = server.post(
        "/libros/agregar",
        json!({"title": "Redes", "author": "Sofía Núñez", "year": 2023}),
    )?;
    assert_eq!(target, "/libros");
    let books = server.get("/libros")?;
    assert_eq!(books["books"][5]["id"], 6);
    assert_eq!(books["books"][5]["available"], true);
    assert_eq!(notices(&books)[0]["details"]["book_id"], 6);

    let again = server.get("/libros")?;
    assert!(notices(&again).is_empty());

    let target = server.post(
        "/usuarios/agregar",
        json!({"name": "Gary Oak", "email": "gary@pokedev.com"}),
    )?;
    assert_eq!(target, "/usuarios");
    let users = server.get("/usuarios")?;
    assert_eq!(users["users"][3]["id"], 4);
    assert_eq!(notices(&users)[0]["action"], "add_user");
    Ok(())
}

#[test]
fn search_matches_title_or_author() -> TestResult<()> {
    let server = TestServer::start()?;

    let page = server.get("/buscar?term=datos")?;
    assert_eq!(page["term"], "datos");
    let ids: Vec<u64> = page["results"]
        .as_array()
        .map(|hits| hits.iter().filter_map(|hit| hit["id"].as_u64()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec![2, 5]);

    let page = server.get("/buscar?term=")?;
    assert_eq!(page["results"], json!([]));

    let resp = server
        .agent
        .post(&format!("{}/buscar", server.base_url))
        .set("Content-Type", "application/json")
        .send_string(&json!({"term": "GARCÍA"}).to_string())?;
    assert_eq!(resp.status(), 200);
    let page: Value = serde_json::from_str(&resp.into_string()?)?;
    assert_eq!(page["results"][0]["book"]["title"], "Estructuras de Datos");
    Ok(())
}

#[test]
fn strict_mode_refuses_unknown_borrowers() -> TestResult<()> {
    let server = TestServer::start_with_args(&["--require-known-user"])?;

    let target = server.post("/prestamos/realizar", json!({"user_id": 99, "book_id": 1}))?;
    assert_eq!(target, "/prestamos/realizar");
    let form = server.get("/prestamos/realizar")?;
    assert_eq!(notices(&form)[0]["message"], "borrower is not a registered user");

    let index = server.get("/")?;
    assert_eq!(index["available_books"], 5);
    Ok(())
}

#[test]
fn relaxed_mode_accepts_unknown_borrowers() -> TestResult<()> {
    let server = TestServer::start()?;

    let target = server.post("/prestamos/realizar", json!({"user_id": 99, "book_id": 1}))?;
    assert_eq!(target, "/prestamos");
    let loans = server.get("/prestamos")?;
    assert_eq!(loans["loans"][0]["user_id"], 99);
    assert!(loans["loans"][0]["user_name"].is_null());

    let health = server.get("/healthz")?;
    assert_eq!(health["ok"], true);
    Ok(())
}

#[test]
fn malformed_bodies_are_rejected() -> TestResult<()> {
    let server = TestServer::start()?;

    let result = server
        .agent
        .post(&format!("{}/prestamos/realizar", server.base_url))
        .set("Content-Type", "application/json")
        .send_string("{\"user_id\": \"one\"}");
    match result {
        Err(ureq::Error::Status(code, _)) => assert!((400..500).contains(&code)),
        other => panic!("expected client error, got {other:?}"),
    }

    let index = server.get("/")?;
    assert_eq!(index["active_loans"], 0);
    assert!(notices(&index).is_empty());
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/healthz");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
