//! Interactive session over an unlocked bucket

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use ebfs_bucket::EncryptedBucket;
use ebfs_storage::OpendalStore;

const HELP: &str = "\
commands:
  cd <dir>                  change remote working directory (`..`, `/`)
  pwd                       print remote working directory
  ls [<pattern>]            list files
  dirs [<pattern>]          list directories
  upload <local> [<dir>]    upload into <dir> (default: working directory)
  download <remote> [<dir>] download into local <dir> (default: .)
  mv <src> <dst>            move files
  rm <pattern>              delete files
  help                      show this text
  exit                      leave the shell";

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Cd(String),
    Pwd,
    Ls(Option<String>),
    Dirs(Option<String>),
    Upload { local: String, remote: Option<String> },
    Download { remote: String, local: Option<String> },
    Mv { source: String, destination: String },
    Rm(String),
    Help,
    Exit,
}

fn parse_command(line: &str) -> std::result::Result<Option<ShellCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<String> = words.map(str::to_string).collect();
    let arg = |i: usize| args.get(i).cloned();
    let required = |i: usize, usage: &str| arg(i).ok_or_else(|| format!("usage: {usage}"));

    let cmd = match verb {
        "cd" => ShellCommand::Cd(arg(0).unwrap_or_else(|| "/".to_string())),
        "pwd" => ShellCommand::Pwd,
        "ls" | "list" => ShellCommand::Ls(arg(0)),
        "dirs" => ShellCommand::Dirs(arg(0)),
        "upload" => ShellCommand::Upload {
            local: required(0, "upload <local> [<dir>]")?,
            remote: arg(1),
        },
        "download" => ShellCommand::Download {
            remote: required(0, "download <remote> [<dir>]")?,
            local: arg(1),
        },
        "mv" | "move" => ShellCommand::Mv {
            source: required(0, "mv <src> <dst>")?,
            destination: required(1, "mv <src> <dst>")?,
        },
        "rm" | "delete" => ShellCommand::Rm(required(0, "rm <pattern>")?),
        "help" | "?" => ShellCommand::Help,
        "exit" | "quit" => ShellCommand::Exit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(cmd))
}

/// Resolve a remote argument against the working directory.
///
/// A leading `/` addresses the bucket root. Trailing `/` and wildcards pass through.
fn resolve_remote(cwd: &str, arg: &str) -> String {
    if let Some(absolute) = arg.strip_prefix('/') {
        return absolute.to_string();
    }
    match (cwd.is_empty(), arg.is_empty()) {
        (true, _) => arg.to_string(),
        (false, true) => format!("{cwd}/"),
        (false, false) => format!("{cwd}/{arg}"),
    }
}

/// Apply `cd <arg>` to the working directory.
fn change_directory(cwd: &str, arg: &str) -> String {
    let mut segments: Vec<&str> = if arg.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|s| !s.is_empty()).collect()
    };
    for part in arg.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    segments.join("/")
}

fn prompt(cwd: &str) {
    print!("ebfs:/{cwd}> ");
    let _ = std::io::stdout().flush();
}

pub async fn run(bucket: &mut EncryptedBucket<OpendalStore>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut cwd = String::new();

    prompt(&cwd);
    while let Some(line) = lines.next_line().await? {
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => {
                prompt(&cwd);
                continue;
            }
            Err(msg) => {
                eprintln!("{msg}");
                prompt(&cwd);
                continue;
            }
        };
        tracing::debug!(?cmd, cwd = %cwd, "shell command");

        let outcome = match cmd {
            ShellCommand::Exit => break,
            ShellCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            ShellCommand::Pwd => {
                println!("/{cwd}");
                Ok(())
            }
            ShellCommand::Cd(arg) => {
                cwd = change_directory(&cwd, &arg);
                Ok(())
            }
            ShellCommand::Ls(pattern) => {
                let pattern = resolve_remote(&cwd, pattern.as_deref().unwrap_or(""));
                crate::cmd_ls(bucket, &pattern).await
            }
            ShellCommand::Dirs(pattern) => {
                let pattern = resolve_remote(&cwd, pattern.as_deref().unwrap_or(""));
                crate::cmd_dirs(bucket, &pattern).await
            }
            ShellCommand::Upload { local, remote } => {
                let remote = resolve_remote(&cwd, remote.as_deref().unwrap_or(""));
                crate::cmd_upload(bucket, &local, &remote).await
            }
            ShellCommand::Download { remote, local } => {
                let remote = resolve_remote(&cwd, &remote);
                crate::cmd_download(bucket, &remote, local.as_deref().unwrap_or(".")).await
            }
            ShellCommand::Mv { source, destination } => {
                let source = resolve_remote(&cwd, &source);
                let destination = resolve_remote(&cwd, &destination);
                crate::cmd_mv(bucket, &source, &destination).await
            }
            ShellCommand::Rm(pattern) => {
                let pattern = resolve_remote(&cwd, &pattern);
                crate::cmd_rm(bucket, &pattern).await
            }
        };
        if let Err(e) = outcome {
            eprintln!("error: {e:#}");
        }
        prompt(&cwd);
    }
    Ok(())
}
