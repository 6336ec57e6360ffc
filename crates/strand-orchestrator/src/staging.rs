//! Copies file and directory outputs into the final output directory.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::OrchestratorError;

/// Targets handed out during one staging run.
///
/// A source staged twice reuses its first target; distinct sources sharing a
/// file name get numbered targets (`data.txt`, `data_2.txt`, ...).
#[derive(Debug, Default)]
struct Staged {
  by_source: HashMap<PathBuf, PathBuf>,
  taken: HashSet<PathBuf>,
}

impl Staged {
  fn target(&mut self, outdir: &Path, name: &Path) -> PathBuf {
    let mut target = outdir.join(name);
    let mut n = 2;
    while self.taken.contains(&target) {
      target = outdir.join(numbered(name, n));
      n += 1;
    }
    self.taken.insert(target.clone());
    target
  }
}

fn numbered(name: &Path, n: usize) -> OsString {
  let mut numbered = name.file_stem().unwrap_or(name.as_os_str()).to_os_string();
  numbered.push(format!("_{n}"));
  if let Some(ext) = name.extension() {
    numbered.push(".");
    numbered.push(ext);
  }
  numbered
}

/// Stage every local `File`/`Directory` object in `outputs` into `outdir`,
/// rewriting its `location` and `path` to point at the copy.
pub async fn stage_outputs(outputs: &mut Value, outdir: &Path) -> Result<(), OrchestratorError> {
  let mut staged = Staged::default();
  stage_value(outputs, outdir, &mut staged).await
}

async fn stage_value(
  value: &mut Value,
  outdir: &Path,
  staged: &mut Staged,
) -> Result<(), OrchestratorError> {
  let class = value.get("class").and_then(Value::as_str);
  if matches!(class, Some("File" | "Directory")) {
    return stage_entry(value, outdir, staged).await;
  }

  match value {
    Value::Array(items) => {
      for item in items {
        Box::pin(stage_value(item, outdir, staged)).await?;
      }
    }
    Value::Object(map) => {
      for item in map.values_mut() {
        Box::pin(stage_value(item, outdir, staged)).await?;
      }
    }
    _ => {}
  }
  Ok(())
}

async fn stage_entry(
  entry: &mut Value,
  outdir: &Path,
  staged: &mut Staged,
) -> Result<(), OrchestratorError> {
  let Some(map) = entry.as_object_mut() else {
    return Ok(());
  };
  let source = map
    .get("location")
    .or_else(|| map.get("path"))
    .and_then(Value::as_str)
    .and_then(local_path);
  let Some(source) = source else {
    return Ok(());
  };
  let Some(name) = source.file_name() else {
    return Ok(());
  };

  let staging = |source| OrchestratorError::Staging {
    path: outdir.to_path_buf(),
    source,
  };
  tokio::fs::create_dir_all(outdir).await.map_err(staging)?;
  let outdir = tokio::fs::canonicalize(outdir).await.map_err(staging)?;

  let target = match staged.by_source.get(&source).cloned() {
    Some(target) => target,
    None => {
      let target = staged.target(&outdir, Path::new(name));
      let is_dir = map.get("class").and_then(Value::as_str) == Some("Directory");
      let copied = if is_dir {
        copy_dir(&source, &target).await
      } else {
        tokio::fs::copy(&source, &target).await.map(|_| ())
      };
      copied.map_err(|err| OrchestratorError::Staging {
        path: source.clone(),
        source: err,
      })?;
      debug!(source = %source.display(), target = %target.display(), "output_staged");
      staged.by_source.insert(source, target.clone());
      target
    }
  };

  let location = Url::from_file_path(&target)
    .map(String::from)
    .unwrap_or_else(|()| format!("file://{}", target.display()));
  map.insert("location".into(), Value::String(location));
  map.insert("path".into(), Value::String(target.to_string_lossy().into_owned()));
  Ok(())
}

/// A local filesystem path for `location`, if it names one.
fn local_path(location: &str) -> Option<PathBuf> {
  match Url::parse(location) {
    Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
    Ok(_) => None,
    Err(_) => Some(PathBuf::from(location)),
  }
}

/// Recursively copy a directory.
async fn copy_dir(src: &Path, dest: &Path) -> Result<(), std::io::Error> {
  tokio::fs::create_dir_all(dest).await?;

  let mut entries = tokio::fs::read_dir(src).await?;
  while let Some(entry) = entries.next_entry().await? {
    let src_path = entry.path();
    let dest_path = dest.join(entry.file_name());

    if entry.file_type().await?.is_dir() {
      Box::pin(copy_dir(&src_path, &dest_path)).await?;
    } else {
      tokio::fs::copy(&src_path, &dest_path).await?;
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_local_path() {
    assert_eq!(local_path("file:///tmp/a.txt"), Some(PathBuf::from("/tmp/a.txt")));
    assert_eq!(local_path("relative/b.txt"), Some(PathBuf::from("relative/b.txt")));
    assert_eq!(local_path("s3://bucket/key"), None);
  }

  #[tokio::test]
  async fn test_stage_file_and_directory() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let file = work.path().join("report.txt");
    std::fs::write(&file, "hello").unwrap();
    let dir = work.path().join("parts");
    std::fs::create_dir_all(dir.join("inner")).unwrap();
    std::fs::write(dir.join("inner/a.txt"), "a").unwrap();

    let mut outputs = json!({
      "report": { "class": "File", "location": format!("file://{}", file.display()) },
      "parts": [{ "class": "Directory", "path": dir.display().to_string() }],
      "count": 3
    });

    stage_outputs(&mut outputs, out.path()).await.unwrap();

    let staged_file = out.path().canonicalize().unwrap().join("report.txt");
    assert_eq!(std::fs::read_to_string(&staged_file).unwrap(), "hello");
    assert_eq!(outputs["report"]["path"], json!(staged_file.display().to_string()));
    assert_eq!(
      outputs["report"]["location"],
      json!(Url::from_file_path(&staged_file).unwrap().to_string())
    );
    assert_eq!(
      std::fs::read_to_string(out.path().join("parts/inner/a.txt")).unwrap(),
      "a"
    );
    assert_eq!(outputs["count"], json!(3));
  }

  #[tokio::test]
  async fn test_same_file_name_gets_numbered_target() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    for (dir, body) in [("left", "l"), ("right", "r")] {
      std::fs::create_dir_all(work.path().join(dir)).unwrap();
      std::fs::write(work.path().join(dir).join("data.txt"), body).unwrap();
    }
    let left = work.path().join("left/data.txt").display().to_string();
    let right = work.path().join("right/data.txt").display().to_string();

    let mut outputs = json!({
      "a": { "class": "File", "path": left },
      "b": { "class": "File", "path": right },
      "c": { "class": "File", "path": left }
    });

    stage_outputs(&mut outputs, out.path()).await.unwrap();

    let outdir = out.path().canonicalize().unwrap();
    let first = outdir.join("data.txt");
    let second = outdir.join("data_2.txt");
    assert_eq!(outputs["a"]["path"], json!(first.display().to_string()));
    assert_eq!(outputs["b"]["path"], json!(second.display().to_string()));
    assert_eq!(outputs["c"]["path"], outputs["a"]["path"]);
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "l");
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "r");
  }

  #[test]
  fn test_numbered_names() {
    assert_eq!(numbered(Path::new("data.txt"), 2), OsString::from("data_2.txt"));
    assert_eq!(numbered(Path::new("parts"), 3), OsString::from("parts_3"));
  }

  #[tokio::test]
  async fn test_remote_location_untouched() {
    let out = tempfile::tempdir().unwrap();
    let mut outputs = json!({ "f": { "class": "File", "location": "https://example.com/x" } });
    let before = outputs.clone();

    stage_outputs(&mut outputs, out.path()).await.unwrap();
    assert_eq!(outputs, before);
  }

  #[tokio::test]
  async fn test_missing_file_is_staging_error() {
    let out = tempfile::tempdir().unwrap();
    let mut outputs = json!({ "class": "File", "path": "/definitely/not/here.txt" });

    let err = stage_outputs(&mut outputs, out.path()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Staging { .. }));
  }
}
