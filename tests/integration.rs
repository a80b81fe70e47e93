use mannequin::batch::resolve_selectors;
use mannequin::expand::{Env, Expander};
use mannequin::parse::parse_line;
use mannequin::shell::{Capture, Emitter, SyncSubshell};
use mannequin::{Batch, BatchConfig, Error, Scripts, ShellEvent};

fn test_env() -> Env {
    let mut env: Env = std::env::vars().collect();
    env.insert("HOME".into(), "/home/test".into());
    env.insert("NAME".into(), "world".into());
    env.insert("EMPTY".into(), String::new());
    env
}

fn argv_for(line: &str) -> Vec<String> {
    let parsed = parse_line(line).unwrap();
    let env = test_env();
    let vars = Env::new();
    let subshell = SyncSubshell::new(std::env::temp_dir(), env.clone());
    Expander::new(&vars, &env, &subshell)
        .expand(&parsed.statements[0])
        .argv()
}

fn statement_count(text: &str) -> Option<usize> {
    parse_line(text).ok().map(|p| p.statements.len())
}

macro_rules! argv_test {
    ($name:ident, $cmd:expr, [$($word:expr),* $(,)?]) => {
        #[test]
        fn $name() {
            let expected: Vec<String> = vec![$($word.to_string()),*];
            assert_eq!(argv_for($cmd), expected, "command: {}", $cmd);
        }
    };
}

macro_rules! statements_test {
    ($name:ident, $cmd:expr, $count:expr) => {
        #[test]
        fn $name() {
            assert_eq!(statement_count($cmd), $count, "command: {}", $cmd);
        }
    };
}

macro_rules! select_test {
    ($name:ident, [$($sel:expr),*], [$($want:expr),*]) => {
        #[test]
        fn $name() {
            let names: Vec<String> = ["setup", "build", "test", "package"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let selectors: Vec<&str> = vec![$($sel),*];
            let expected: Vec<String> = vec![$($want.to_string()),*];
            assert_eq!(resolve_selectors(&names, &selectors).unwrap(), expected);
        }
    };
}

// ── Expansion: words, quoting, variables ──

argv_test!(plain_words, "echo hello world", ["echo", "hello", "world"]);
argv_test!(single_quotes_are_literal, "echo '$NAME'", ["echo", "$NAME"]);
argv_test!(double_quotes_expand, "echo \"hello $NAME\"", ["echo", "hello world"]);
argv_test!(braced_variable, "echo ${NAME}s", ["echo", "worlds"]);
argv_test!(unset_variable_vanishes, "echo $UNSET_XYZ end", ["echo", "end"]);
argv_test!(empty_variable_vanishes, "echo $EMPTY end", ["echo", "end"]);
argv_test!(quoted_empty_is_kept, "printf \"$EMPTY\"", ["printf", ""]);
argv_test!(tilde_is_home, "ls ~/src", ["ls", "/home/test/src"]);
argv_test!(escaped_space_joins, "touch a\\ b", ["touch", "a b"]);
argv_test!(unsupported_expression_vanishes, "echo ${NAME:-x} z", ["echo", "z"]);
argv_test!(inline_env_not_in_args, "NAME=other echo $NAME", ["echo", "world"]);
argv_test!(adjacent_quotes_concatenate, "echo 'a'\"b\"c", ["echo", "abc"]);

// ── Expansion: command substitution ──

argv_test!(substitution_runs, "echo $(echo inner)", ["echo", "inner"]);
argv_test!(backquote_substitution, "echo `echo tick`", ["echo", "tick"]);
argv_test!(substitution_sees_env, "echo $(printenv NAME)", ["echo", "world"]);
argv_test!(substitution_collapses_lines, "echo $(printf 'a\\nb\\n')", ["echo", "a b"]);
argv_test!(nested_substitution, "echo $(echo $(echo deep))", ["echo", "deep"]);
argv_test!(failing_substitution_is_empty, "echo $(false) x", ["echo", "x"]);
argv_test!(quoted_substitution, "echo \"[$(echo q)]\"", ["echo", "[q]"]);

// ── Parsing: statements and rejected syntax ──

statements_test!(one_statement, "echo hi", Some(1));
statements_test!(semicolon_splits, "echo a; echo b", Some(2));
statements_test!(comment_only, "# just a note", Some(0));
statements_test!(trailing_comment, "echo hi # note", Some(1));
statements_test!(quoted_semicolon, "echo 'a; b'", Some(1));
statements_test!(pipeline_rejected, "ls | wc -l", None);
statements_test!(and_list_rejected, "true && echo ok", None);
statements_test!(redirect_rejected, "echo hi > out.txt", None);
statements_test!(unterminated_quote_rejected, "echo 'open", None);
statements_test!(unmatched_array_rejected, "ARR=(a b", None);

// ── Selectors ──

select_test!(select_all, [], ["setup", "build", "test", "package"]);
select_test!(select_one, ["test"], ["test"]);
select_test!(select_closed_range, ["build..test"], ["build", "test"]);
select_test!(select_from, ["test.."], ["test", "package"]);
select_test!(select_until, ["..build"], ["setup", "build"]);
select_test!(select_everything, [".."], ["setup", "build", "test", "package"]);
select_test!(select_reversed_is_empty, ["package..build"], []);
select_test!(select_literal_passes, ["make all"], ["make all"]);
select_test!(select_concatenates, ["package", "setup..build"], ["package", "setup", "build"]);

#[test]
fn select_unknown_endpoint_fails() {
    let names = vec!["a".to_string()];
    assert!(matches!(
        resolve_selectors(&names, &["a..b"]),
        Err(Error::Selector { .. })
    ));
}

#[test]
fn select_three_groups_fails() {
    let names = vec!["a".to_string()];
    assert!(resolve_selectors(&names, &["a..a..a"]).is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// Batch runs against a temporary build directory
// ═══════════════════════════════════════════════════════════════════════════

struct Run {
    batch: Batch,
    output: Capture,
    _root: tempfile::TempDir,
}

fn batch_with(json: &str, dry_run: bool) -> Run {
    let root = tempfile::tempdir().unwrap();
    let batch = Batch::new(BatchConfig {
        build_dir: root.path().join("build"),
        dry_run,
        ..BatchConfig::default()
    });
    batch.load_scripts(Scripts::from_json_str(json).unwrap()).unwrap();
    Run {
        batch,
        output: Capture::new(),
        _root: root,
    }
}

async fn run_selected(run: &Run, selectors: &[&str]) -> Vec<mannequin::JobOutcome> {
    let sink = Emitter::<ShellEvent>::new();
    sink.pipe(run.output.clone());
    let actions = run.batch.parse_actions(selectors).unwrap();
    run.batch.run_actions(&actions, &sink).await.unwrap()
}

const BUILD_TEST: &str = r#"{
    "scripts": {
        "build": ["echo hi"],
        "test": ["FOO=1", "echo $FOO"]
    }
}"#;

#[cfg(unix)]
#[tokio::test]
async fn range_runs_both_actions() {
    let run = batch_with(BUILD_TEST, false);
    let outcomes = run_selected(&run, &["build..test"]).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    let out = run.output.contents();
    assert!(out.contains("hi"), "output: {out:?}");
    assert!(out.contains('1'), "output: {out:?}");
    assert_eq!(run.batch.last_state().unwrap().env["FOO"], "1");
}

#[tokio::test]
async fn dry_run_prints_expanded_commands() {
    let run = batch_with(BUILD_TEST, true);
    let outcomes = run_selected(&run, &[]).await;
    assert!(outcomes.iter().all(|o| o.is_ok()));
    let out = run.output.contents();
    assert!(out.contains("echo hi\r\n"), "output: {out:?}");
    assert!(out.contains("echo 1\r\n"), "output: {out:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn dry_run_matches_real_state() {
    let real = batch_with(BUILD_TEST, false);
    let dry = batch_with(BUILD_TEST, true);
    run_selected(&real, &[]).await;
    run_selected(&dry, &[]).await;
    assert_eq!(
        real.batch.last_state().unwrap().vars,
        dry.batch.last_state().unwrap().vars
    );
}

#[cfg(unix)]
#[tokio::test]
async fn failure_stops_the_script() {
    let run = batch_with(
        r#"{"scripts": {"a": ["false", "echo unreachable"], "b": "echo never"}}"#,
        false,
    );
    let outcomes = run_selected(&run, &[]).await;
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].is_ok());
    let out = run.output.contents();
    assert!(out.contains("Exit 1."), "output: {out:?}");
    assert!(!out.contains("unreachable\r\n"), "output: {out:?}");
    assert!(!out.contains("never"), "output: {out:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn continue_policy_keeps_going() {
    let run = batch_with(
        r#"{"scripts": {"a": [{"cmd": "false", "fail": "continue"}, "echo after"]}}"#,
        false,
    );
    let outcomes = run_selected(&run, &[]).await;
    assert!(outcomes[0].is_ok());
    let out = run.output.contents();
    assert!(out.contains("continuing anyway"), "output: {out:?}");
    assert!(out.contains("after"), "output: {out:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn override_precedence_wins_across_actions() {
    let run = batch_with(
        r#"{"scripts": {
            "pin": [{"cmd": "MODE=release", "precedence": "override"}],
            "try": ["MODE=debug", "printenv MODE"]
        }}"#,
        false,
    );
    let outcomes = run_selected(&run, &[]).await;
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(run.output.contents().contains("release"));
    assert_eq!(run.batch.last_state().unwrap().env["MODE"], "release");
}

#[cfg(unix)]
#[tokio::test]
async fn failed_action_does_not_leak_state() {
    let run = batch_with(
        r#"{"scripts": {"ok": ["KEEP=1"], "bad": ["LEAK=1", "false"]}}"#,
        false,
    );
    run_selected(&run, &[]).await;
    let state = run.batch.last_state().unwrap();
    assert_eq!(state.env["KEEP"], "1");
    assert!(!state.env.contains_key("LEAK"));
}

#[cfg(unix)]
#[tokio::test]
async fn heredoc_is_piped_to_stdin() {
    let run = batch_with(
        r#"{"scripts": {"doc": [["cat <<EOF", "first $NOT_EXPANDED", "second", "EOF"]]}}"#,
        false,
    );
    let outcomes = run_selected(&run, &[]).await;
    assert!(outcomes[0].is_ok());
    let out = run.output.contents();
    assert!(out.contains("first $NOT_EXPANDED\nsecond"), "output: {out:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn substitution_feeds_arguments() {
    let run = batch_with(
        r#"{"scripts": {"sub": ["WHO=$(echo subshell)", "printenv WHO"]}}"#,
        false,
    );
    run_selected(&run, &[]).await;
    assert!(run.output.contents().contains("subshell"));
}

#[cfg(unix)]
#[tokio::test]
async fn actions_start_in_build_dir() {
    let run = batch_with(r#"{"scripts": {"mk": ["touch marker"]}}"#, false);
    run_selected(&run, &[]).await;
    assert!(run.batch.build_dir().join("marker").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn cd_persists_within_an_action_only() {
    let run = batch_with(
        r#"{"scripts": {"a": ["mkdir sub", "cd sub", "touch inner"], "b": ["touch outer"]}}"#,
        false,
    );
    run_selected(&run, &[]).await;
    let build = run.batch.build_dir();
    assert!(build.join("sub/inner").exists());
    assert!(build.join("outer").exists());
}

#[tokio::test]
async fn multiple_statements_fail_the_action() {
    let run = batch_with(r#"{"scripts": {"two": ["echo a; echo b"]}}"#, true);
    let outcomes = run_selected(&run, &[]).await;
    assert!(matches!(outcomes[0].error, Some(Error::MultipleStatements(_))));
}

#[test]
fn double_load_is_rejected() {
    let run = batch_with(BUILD_TEST, true);
    assert!(matches!(
        run.batch.load_scripts(Scripts::default()),
        Err(Error::ScriptsAlreadyLoaded)
    ));
}
