// tests/console.rs

mod common;
use crate::common::{
    ConfigFileBuilder, FakeToolRunner, LONG_RUNNING, init_tracing, sh_config, supervisor,
    with_timeout,
};

use std::sync::Arc;
use std::time::Duration;

use repovisor::console::{Command, Console, Reply};
use repovisor::fs::mock::MockFileSystem;
use repovisor::supervisor::Supervisor;
use tokio::sync::mpsc;

const CALLER: &str = "alice";

struct Harness {
    console: Console,
    rx: mpsc::Receiver<Reply>,
    fs: MockFileSystem,
}

impl Harness {
    fn new() -> Self {
        Self::with_ttl(Duration::from_secs(60))
    }

    fn with_ttl(ttl: Duration) -> Self {
        let fs = MockFileSystem::new();
        let cfg = ConfigFileBuilder::new().with_session_ttl(ttl).build();
        let sup = Supervisor::with_backends(
            &cfg,
            Arc::new(fs.clone()),
            Arc::new(FakeToolRunner::new()),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(16);
        Self {
            console: Console::new(sup, ttl, tx),
            rx,
            fs,
        }
    }

    async fn say(&mut self, line: &str) -> String {
        self.console.handle(CALLER, line).await.unwrap();
        self.next().await
    }

    async fn next(&mut self) -> String {
        let reply = with_timeout(self.rx.recv()).await.expect("outbox closed");
        assert_eq!(reply.caller, CALLER);
        reply.text
    }
}

#[test]
fn commands_are_parsed_with_their_argument() {
    assert_eq!(
        Command::parse("/host https://example/repo"),
        Command::Host(Some("https://example/repo".to_string()))
    );
    assert_eq!(Command::parse("/host"), Command::Host(None));
    assert_eq!(Command::parse("  /stop abc123 "), Command::Stop(Some("abc123".to_string())));
    assert_eq!(Command::parse("/show_vars"), Command::ShowVars);
    assert_eq!(Command::parse("/nope"), Command::Unknown("nope".to_string()));
    assert_eq!(
        Command::parse("KEY= padded \n"),
        Command::Text("KEY= padded ".to_string())
    );
}

#[tokio::test]
async fn start_and_help_list_the_commands() {
    let mut h = Harness::new();
    assert!(h.say("/start").await.contains("/host <repo>"));
    let help = h.say("/help").await;
    assert!(help.contains("/show_vars"));
    assert!(help.contains("/import"));
    assert!(h.say("/vars").await.contains("/edit_var"));
}

#[tokio::test]
async fn add_flow_sets_and_persists() {
    let mut h = Harness::new();

    let prompt = h.say("/add_var").await;
    assert!(prompt.contains("VAR_NAME=value"));
    assert!(prompt.contains("(no variables yet)"));

    assert_eq!(h.say("TOKEN=abc=def").await, "Added TOKEN");
    assert_eq!(
        h.fs.contents("persistent.env").as_deref(),
        Some("TOKEN=abc=def\n")
    );
    assert!(h.say("/show_vars").await.contains("TOKEN=abc=def"));
}

#[tokio::test]
async fn edit_flow_only_touches_existing_keys() {
    let mut h = Harness::new();
    h.console.supervisor().config_set("PORT", "80").unwrap();

    let prompt = h.say("/edit_var").await;
    assert!(prompt.contains("PORT"));
    assert_eq!(h.say("PORT=8080").await, "Updated PORT");
    assert_eq!(h.fs.contents("persistent.env").as_deref(), Some("PORT=8080\n"));

    h.say("/edit_var").await;
    assert_eq!(h.say("MISSING=1").await, "Variable MISSING not found");

    h.say("/edit_var").await;
    assert_eq!(h.say("no separator").await, "Invalid format. Use: VAR_NAME=new_value");
}

#[tokio::test]
async fn delete_flow_reports_missing_keys() {
    let mut h = Harness::new();
    h.console.supervisor().config_set("OLD", "1").unwrap();

    h.say("/del_var").await;
    assert_eq!(h.say("OLD").await, "Deleted OLD");
    assert_eq!(h.fs.contents("persistent.env").as_deref(), Some(""));

    h.say("/del_var").await;
    assert_eq!(h.say("OLD").await, "Variable OLD not found");
}

#[tokio::test]
async fn delete_flow_hides_reserved_keys() {
    let mut h = Harness::new();
    h.console.supervisor().config_set("RENDER_X", "internal").unwrap();

    h.say("/del_var").await;
    assert_eq!(h.say("RENDER_X").await, "Variable RENDER_X not found");
    assert_eq!(h.fs.contents("persistent.env"), None);

    // Still stored; only the console refused to touch it.
    assert!(h.console.supervisor().config_delete("RENDER_X"));
}

#[tokio::test]
async fn cancel_ends_the_conversation() {
    let mut h = Harness::new();

    assert_eq!(h.say("/cancel").await, "Nothing to cancel");
    h.say("/add_var").await;
    assert_eq!(h.say("/cancel").await, "Operation cancelled");
    assert_eq!(
        h.say("A=1").await,
        "Unknown input. Type /help for available commands"
    );
    assert!(h.console.supervisor().config_list().is_empty());
}

#[tokio::test]
async fn expired_conversation_is_ignored() {
    let mut h = Harness::with_ttl(Duration::ZERO);

    h.say("/add_var").await;
    assert_eq!(
        h.say("A=1").await,
        "Unknown input. Type /help for available commands"
    );
    assert!(h.console.supervisor().config_list().is_empty());
}

#[tokio::test]
async fn import_requires_an_env_file_and_reports_skips() {
    let mut h = Harness::new();
    h.fs.add_file("vars.env", "A=1\nB=2\n#comment\n\nBADLINE\nA=3\n");

    assert_eq!(h.say("/import").await, "Please provide a .env file: /import <file.env>");
    assert_eq!(h.say("/import vars.txt").await, "Please provide a .env file");

    let report = h.say("/import vars.env").await;
    assert!(report.starts_with("Variables updated from file: 3 applied, 1 skipped"), "{report}");
    assert!(report.contains("line 5: BADLINE"), "{report}");
    assert_eq!(
        h.console.supervisor().env().get("A").as_deref(),
        Some("3")
    );

    let missing = h.say("/import other.env").await;
    assert!(missing.starts_with("Error:"), "{missing}");
}

#[tokio::test]
async fn save_reports_persist_failures() {
    let mut h = Harness::new();
    h.console.supervisor().config_set("A", "1").unwrap();

    assert_eq!(h.say("/save").await, "Saved 1 variables to persistent.env");

    h.fs.fail_writes(true);
    let reply = h.say("/save").await;
    assert!(reply.starts_with("Error: failed to persist"), "{reply}");

    // A failed write after an edit keeps the edit and says so.
    h.say("/add_var").await;
    let reply = h.say("B=2").await;
    assert!(reply.starts_with("Added B\nError: failed to persist"), "{reply}");
    assert_eq!(h.console.supervisor().env().get("B").as_deref(), Some("2"));
}

#[tokio::test]
async fn unknown_commands_and_ids() {
    let mut h = Harness::new();
    assert_eq!(h.say("/frobnicate").await, "Unknown command /frobnicate. Type /help");
    assert_eq!(h.say("/stop abcdef").await, "Instance abcdef not found");
    assert_eq!(h.say("/stop").await, "Provide an instance id (/list to see ids)");
    assert_eq!(h.say("/list").await, "No active instances");
    assert_eq!(h.say("/host").await, "Please provide a repository URL: /host <repo>");
}

#[cfg(unix)]
#[tokio::test]
async fn host_list_stop_round_trip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools =
        FakeToolRunner::new().with_repo("https://example/repo", &[("main.sh", LONG_RUNNING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);
    let (tx, mut rx) = mpsc::channel(16);
    let console = Console::new(sup.clone(), Duration::from_secs(60), tx);

    console.handle(CALLER, "/host https://example/repo").await.unwrap();

    let mut texts = Vec::new();
    loop {
        let reply = with_timeout(rx.recv()).await.unwrap();
        let done = reply.text.starts_with("Deployed!");
        texts.push(reply.text);
        if done {
            break;
        }
    }
    assert_eq!(texts[0], "Cloning https://example/repo...");
    assert_eq!(texts[1], "Starting main.sh...");

    let id = sup.list()[0].id.clone();
    assert!(texts[2].contains(&format!("id: {id}")));

    console.handle(CALLER, "/list").await.unwrap();
    let listing = with_timeout(rx.recv()).await.unwrap().text;
    assert!(listing.contains(&format!("id: {id}")), "{listing}");
    assert!(listing.contains("status: Running"), "{listing}");

    console.handle(CALLER, &format!("/stop {id}")).await.unwrap();
    assert_eq!(
        with_timeout(rx.recv()).await.unwrap().text,
        format!("Instance {id} stopping")
    );

    console.handle(CALLER, "/list").await.unwrap();
    assert_eq!(with_timeout(rx.recv()).await.unwrap().text, "No active instances");
}

#[tokio::test]
async fn failed_host_reports_the_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&sh_config(dir.path()), &FakeToolRunner::new());
    let (tx, mut rx) = mpsc::channel(16);
    let console = Console::new(sup, Duration::from_secs(60), tx);

    console.handle(CALLER, "/host https://example/missing").await.unwrap();

    assert_eq!(
        with_timeout(rx.recv()).await.unwrap().text,
        "Cloning https://example/missing..."
    );
    let err = with_timeout(rx.recv()).await.unwrap().text;
    assert!(
        err.starts_with("Error: failed to fetch 'https://example/missing'"),
        "{err}"
    );
}
