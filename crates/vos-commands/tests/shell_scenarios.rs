//! End-to-end scenarios combining the registered built-ins with the shell
//! engine, covering the concrete scenarios and testable properties named in
//! spec.md §8.

use std::sync::Arc;

use vos_provider::Permission;
use vos_provider_memory::MemoryProvider;
use vos_shell::Shell;
use vos_vfs::VirtualOs;

fn shell_with_builtins() -> Shell {
    let mem = Arc::new(MemoryProvider::new());
    let facade = Arc::new(VirtualOs::new(Arc::clone(&mem) as Arc<dyn vos_provider::Provider>));
    vos_commands::register_builtins(&mem, Arc::clone(&facade));
    Shell::new(facade, "tester")
}

#[tokio::test]
async fn s1_grep_finds_line_with_number_prefix() {
    let shell = shell_with_builtins();
    shell
        .facade()
        .write("/home/tester/notes.txt", Box::new(std::io::Cursor::new(b"hello world\nfoo bar\nbaz qux\n".to_vec())))
        .await
        .unwrap();
    let r = shell.execute("grep -n bar ~/notes.txt").await;
    assert!(r.output.contains("2:foo bar"), "got {:?}", r.output);
}

#[tokio::test]
async fn s2_tail_last_line() {
    let shell = shell_with_builtins();
    shell
        .facade()
        .write("/home/tester/notes.txt", Box::new(std::io::Cursor::new(b"hello world\nfoo bar\nbaz qux\n".to_vec())))
        .await
        .unwrap();
    let r = shell.execute("tail -n 1 ~/notes.txt").await;
    assert_eq!(r.output.trim_end(), "baz qux");
}

#[tokio::test]
async fn s3_touch_creates_empty_file() {
    let shell = shell_with_builtins();
    let r = shell.execute("touch ~/new.txt").await;
    assert_eq!(r.code, 0);
    let entry = shell.facade().stat("/home/tester/new.txt").await.unwrap();
    assert!(!entry.is_dir);
    assert_eq!(entry.size, 0);
}

#[tokio::test]
async fn s4_quoted_metacharacters_survive_pipeline() {
    let shell = shell_with_builtins();
    let r = shell.execute("echo '* ? [a]' | head -n 1").await;
    assert_eq!(r.output, "* ? [a]\n");
}

#[tokio::test]
async fn true_and_false_carry_exact_codes_through_chains() {
    let shell = shell_with_builtins();
    let r = shell.execute("true && echo x").await;
    assert_eq!(r.output, "x\n");
    assert_eq!(r.code, 0);

    let r = shell.execute("false || echo y").await;
    assert_eq!(r.output, "y\n");
    assert_eq!(r.code, 0);
}

#[tokio::test]
async fn pipeline_single_line_output() {
    let shell = shell_with_builtins();
    let r = shell.execute("echo a b c | head -n 1").await;
    assert!(r.output.ends_with("a b c\n"));
}

#[tokio::test]
async fn grep_dash_c_reports_per_file_counts_not_aggregate() {
    let shell = shell_with_builtins();
    shell.facade().write("/a.txt", Box::new(std::io::Cursor::new(b"x\nx\n".to_vec()))).await.unwrap();
    shell.facade().write("/b.txt", Box::new(std::io::Cursor::new(b"x\n".to_vec()))).await.unwrap();
    let r = shell.execute("grep -c x /a.txt /b.txt").await;
    assert!(r.output.contains("/a.txt:2"));
    assert!(r.output.contains("/b.txt:1"));
    assert!(!r.output.contains(":3"));
}

#[tokio::test]
async fn directory_argument_substitutes_ls() {
    let shell = shell_with_builtins();
    shell.facade().mkdir("/work", Permission::RWX).await.unwrap();
    shell.facade().write("/work/a.txt", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
    let r = shell.execute("/work").await;
    assert!(r.output.contains("a.txt"));
}

#[tokio::test]
async fn find_name_filters_recursively() {
    let shell = shell_with_builtins();
    shell.facade().mkdir("/proj", Permission::RWX).await.unwrap();
    shell.facade().mkdir("/proj/src", Permission::RWX).await.unwrap();
    shell.facade().write("/proj/src/main.rs", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
    shell.facade().write("/proj/readme.md", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
    let r = shell.execute("find /proj -name '*.rs'").await;
    assert!(r.output.contains("/proj/src/main.rs"));
    assert!(!r.output.contains("readme.md"));
}

#[tokio::test]
async fn jsonq_navigates_array_and_field() {
    let shell = shell_with_builtins();
    shell
        .facade()
        .write("/data.json", Box::new(std::io::Cursor::new(br#"{"items":[{"name":"a"},{"name":"b"}]}"#.to_vec())))
        .await
        .unwrap();
    let r = shell.execute("jsonq .items[1].name /data.json").await;
    assert_eq!(r.output, "b\n");
}

#[tokio::test]
async fn cp_copies_file_contents_through_the_shell() {
    let shell = shell_with_builtins();
    shell.facade().write("/a.txt", Box::new(std::io::Cursor::new(b"payload".to_vec()))).await.unwrap();
    let r = shell.execute("cp /a.txt /b.txt").await;
    assert_eq!(r.code, 0);
    let mut f = shell.facade().open("/b.txt").await.unwrap();
    assert_eq!(f.read_to_end().await.unwrap(), b"payload");
}

#[tokio::test]
async fn sed_substitution() {
    let shell = shell_with_builtins();
    shell.facade().write("/f.txt", Box::new(std::io::Cursor::new(b"foo foo bar\n".to_vec()))).await.unwrap();
    let r = shell.execute("sed s/foo/baz/g /f.txt").await;
    assert_eq!(r.output, "baz baz bar\n");
}
