mod common;

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

use common::ErrorLog;
use domenv::{
    env, env_with_input, ConfigError, EnvConfig, EnvError, Features, ResourceKinds, VirtualConsole,
};
use tempfile::TempDir;

#[tokio::test]
async fn empty_html_fires_done_once_with_document() {
    let done_calls = Rc::new(Cell::new(0));
    let had_body = Rc::new(Cell::new(false));
    let calls = Rc::clone(&done_calls);
    let body = Rc::clone(&had_body);

    let window = env(EnvConfig::new().html("").done(move |result| {
        calls.set(calls.get() + 1);
        let window = result.unwrap();
        body.set(window.document().query_selector("body").is_some());
    }))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(done_calls.get(), 1);
    assert!(had_body.get());
    assert_eq!(window.location().as_str(), "about:blank");
}

#[tokio::test]
async fn empty_input_string_creates_a_window() {
    let created = Rc::new(Cell::new(false));
    let seen = Rc::clone(&created);

    env(EnvConfig::from_input("").created(move |result| {
        seen.set(result.is_ok_and(|window| window.document().query_selector("html").is_some()));
    }))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(created.get());
}

#[tokio::test]
async fn unreachable_primary_url_is_fatal() {
    let console = VirtualConsole::new();
    let errors = ErrorLog::attach(&console);
    let events = Rc::new(RefCell::new(Vec::new()));
    let created_events = Rc::clone(&events);
    let onload_events = Rc::clone(&events);
    let done_events = Rc::clone(&events);

    let result = env(EnvConfig::new()
        .url("http://127.0.0.1:9/")
        .virtual_console(console)
        .created(move |result| {
            created_events
                .borrow_mut()
                .push(format!("created:{}", result.is_err()))
        })
        .onload(move |_| onload_events.borrow_mut().push("onload".to_string()))
        .done(move |result| {
            done_events
                .borrow_mut()
                .push(format!("done:{}", result.is_err()))
        }))
    .unwrap()
    .run()
    .await;

    assert!(matches!(result, Err(EnvError::Load { .. })));
    assert_eq!(events.borrow().as_slice(), ["created:true", "done:true"]);
    assert!(errors.messages().is_empty(), "fatal errors bypass the console");
}

#[tokio::test]
async fn missing_callbacks_are_rejected_up_front() {
    assert!(matches!(
        env(EnvConfig::new().html("<p></p>")),
        Err(ConfigError::MissingCallback)
    ));
}

#[tokio::test]
async fn invalid_url_reaches_done_as_config_error() {
    let failed = Rc::new(Cell::new(false));
    let seen = Rc::clone(&failed);
    let result = env(EnvConfig::new().url("not a url").done(move |result| {
        seen.set(matches!(
            result,
            Err(EnvError::Config(ConfigError::InvalidUrl { .. }))
        ));
    }))
    .unwrap()
    .run()
    .await;

    assert!(result.is_err());
    assert!(failed.get());
}

#[tokio::test]
async fn inline_sources_run_before_done() {
    let increment = "window.counter = (window.counter || 0) + 1;";
    let counter_at_done = Rc::new(Cell::new(0));
    let seen = Rc::clone(&counter_at_done);

    env(EnvConfig::new()
        .html("<div></div>")
        .src(increment)
        .src(increment)
        .src(increment)
        .done(move |result| {
            let window = result.unwrap();
            seen.set(window.eval_with::<i32>("window.counter", "check.js").unwrap());
        }))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(counter_at_done.get(), 3);
}

#[tokio::test]
async fn callbacks_fire_in_lifecycle_order() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let created = Rc::clone(&order);
    let onload = Rc::clone(&order);
    let done = Rc::clone(&order);

    env(EnvConfig::new()
        .html("<script>window.ran = true;</script>")
        .created(move |_| created.borrow_mut().push("created"))
        .onload(move |window| {
            assert!(window.eval_with::<bool>("window.ran", "ran.js").unwrap());
            onload.borrow_mut().push("onload");
        })
        .done(move |_| done.borrow_mut().push("done")))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(order.borrow().as_slice(), ["created", "onload", "done"]);
}

#[tokio::test]
async fn document_scripts_run_before_config_scripts() {
    let window = env(EnvConfig::new()
        .html("<script>window.trace = ['markup'];</script>")
        .src("window.trace.push('src');")
        .done(|_| {}))
    .unwrap()
    .run()
    .await
    .unwrap();

    let trace: Vec<String> = window.eval_with("window.trace", "trace.js").unwrap();
    assert_eq!(trace, ["markup", "src"]);
}

#[tokio::test]
async fn script_exceptions_are_reported_not_fatal() {
    let console = VirtualConsole::new();
    let errors = ErrorLog::attach(&console);
    let done_ok = Rc::new(Cell::new(false));
    let seen = Rc::clone(&done_ok);

    let window = env(EnvConfig::new()
        .html("<p></p>")
        .src("throw new Error('boom');")
        .src("window.after = 1;")
        .virtual_console(console)
        .done(move |result| seen.set(result.is_ok())))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(done_ok.get());
    let entries = errors.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].0.starts_with("Error running script"));
    assert!(entries[0].1.as_deref().unwrap_or("").contains("boom"));
    assert_eq!(window.eval_with::<i32>("window.after", "after.js").unwrap(), 1);
}

#[tokio::test]
async fn scripts_added_from_onload_run_before_done() {
    let value_at_done = Rc::new(Cell::new(0));
    let seen = Rc::clone(&value_at_done);

    env(EnvConfig::new()
        .html("")
        .onload(|window| window.add_inline_script("window.late = 42;"))
        .done(move |result| {
            let window = result.unwrap();
            seen.set(window.eval_with::<i32>("window.late", "late.js").unwrap());
        }))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(value_at_done.get(), 42);
}

#[tokio::test]
async fn referrer_and_cookie_are_visible_to_scripts() {
    let window = env(EnvConfig::new()
        .html("")
        .url("http://example.com/")
        .referrer("https://github.com/tmpvar/jsdom")
        .cookie("session=abc; Path=/")
        .src("window.seen = document.referrer + '|' + document.cookie;")
        .done(|_| {}))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(window.document().referrer(), "https://github.com/tmpvar/jsdom");
    let seen: String = window.eval_with("window.seen", "seen.js").unwrap();
    assert_eq!(seen, "https://github.com/tmpvar/jsdom|session=abc");
}

#[tokio::test]
async fn file_documents_load_relative_scripts() {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join("index.html");
    let mut file = std::fs::File::create(&page).unwrap();
    write!(
        file,
        "<html><head><script src=\"lib.js\"></script></head><body><script>window.page = window.lib + 1;</script></body></html>"
    )
    .unwrap();
    std::fs::write(dir.path().join("lib.js"), "window.lib = 1;").unwrap();

    let window = env(EnvConfig::new().file(&page).done(|_| {}))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(window.location().scheme(), "file");
    assert!(window.location().path().ends_with("/index.html"));
    assert_eq!(window.eval_with::<i32>("window.page", "page.js").unwrap(), 2);
}

#[tokio::test]
async fn non_utf8_documents_still_construct() {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join("latin1.html");
    std::fs::write(&page, b"<p>caf\xe9</p>").unwrap();
    let done_ok = Rc::new(Cell::new(false));
    let seen = Rc::clone(&done_ok);

    let window = env(EnvConfig::new()
        .file(&page)
        .done(move |result| seen.set(result.is_ok())))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(done_ok.get());
    let text = window.document().query_selector("p").unwrap().as_node().text_contents();
    assert!(text.starts_with("caf"));
}

#[tokio::test]
async fn existing_path_input_is_loaded_as_file() {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join("page.html");
    std::fs::write(&page, "<p id=\"from-disk\">hi</p>").unwrap();

    let window = env_with_input(page.display().to_string(), |_| {})
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(window.document().query_selector("#from-disk").is_some());
    assert_eq!(window.location().scheme(), "file");
}

#[tokio::test]
async fn markup_input_is_parsed_not_fetched() {
    let window = env_with_input("<p class=\"x\">inline</p>", |_| {})
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(window.document().query_selector("p.x").is_some());
}

#[tokio::test]
async fn missing_local_script_is_non_fatal() {
    let console = VirtualConsole::new();
    let errors = ErrorLog::attach(&console);

    let window = env(EnvConfig::new()
        .html("")
        .script("path/to/invalid.js")
        .src("window.ok = true;")
        .virtual_console(console)
        .done(|result| assert!(result.is_ok())))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(
        errors.messages(),
        ["Could not load script: \"path/to/invalid.js\"".to_string()]
    );
    assert!(window.eval_with::<bool>("window.ok", "ok.js").unwrap());
}

#[tokio::test]
async fn disabled_fetching_drops_external_scripts_silently() {
    let console = VirtualConsole::new();
    let errors = ErrorLog::attach(&console);

    let window = env(EnvConfig::new()
        .html("<script src=\"missing.js\"></script><script>window.inline = true;</script>")
        .script("path/to/invalid.js")
        .features(Features {
            fetch_external_resources: ResourceKinds::none(),
            ..Default::default()
        })
        .virtual_console(console)
        .done(|_| {}))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(errors.messages().is_empty());
    assert!(window.eval_with::<bool>("window.inline", "inline.js").unwrap());
}

#[tokio::test]
async fn disabled_processing_runs_nothing() {
    let window = env(EnvConfig::new()
        .html("<script>window.inline = true;</script>")
        .features(Features {
            process_external_resources: ResourceKinds::none(),
            ..Default::default()
        })
        .done(|_| {}))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert!(window
        .eval_with::<bool>("typeof window.inline === 'undefined'", "check.js")
        .unwrap());
}

#[tokio::test]
async fn script_console_output_reaches_the_virtual_console() {
    let console = VirtualConsole::new();
    let logged = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&logged);
    console.on("log", move |event| {
        if let domenv::ConsoleEvent::Script { message, .. } = event {
            sink.lock().unwrap().push(message.clone());
        }
    });

    env(EnvConfig::new()
        .html("")
        .src("console.log('hello', 'world');")
        .virtual_console(console)
        .done(|_| {}))
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(logged.lock().unwrap().as_slice(), ["hello world".to_string()]);
}
