//! Line-delimited JSON boundary between the UI shell and the catalog.
//!
//! Each input line is a request frame:
//!
//! ```text
//! {"id": 7, "request": {"command": "get-tags"}}
//! ```
//!
//! and each output line the matching response frame:
//!
//! ```text
//! {"id": 7, "result": [{"id": 1, "name": "beach"}]}
//! ```

mod handler;

pub use handler::{
    file_preview, select_files, Handler, MediaMetadata, Request, SaveMediaRequest, SelectedFile,
    UpdateMediaRequest,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct RequestFrame {
    #[serde(default)]
    pub id: Option<u64>,
    pub request: Request,
}

#[derive(Debug, Serialize)]
pub struct ResponseFrame {
    pub id: Option<u64>,
    pub result: Value,
}

/// Decode one line and answer it. Malformed frames get a failure envelope,
/// keeping the id when it can be read.
pub fn handle_line(handler: &Handler, line: &str) -> ResponseFrame {
    let raw: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return malformed(None, e),
    };
    let id = raw.get("id").and_then(Value::as_u64);

    match serde_json::from_value::<RequestFrame>(raw) {
        Ok(frame) => {
            debug!("Handling request {:?}", frame.id);
            ResponseFrame { id: frame.id, result: handler.handle(frame.request) }
        }
        Err(e) => malformed(id, e),
    }
}

fn malformed(id: Option<u64>, e: impl std::fmt::Display) -> ResponseFrame {
    warn!("Malformed request: {}", e);
    ResponseFrame {
        id,
        result: json!({ "success": false, "error": format!("Malformed request: {}", e) }),
    }
}

/// Serve requests one at a time until `reader` hits EOF.
///
/// Lines are read as raw bytes; a line that is not UTF-8 is answered like
/// any other malformed frame.
pub async fn serve<R, W>(handler: &Handler, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut served = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        let response = match std::str::from_utf8(&line) {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => handle_line(handler, text),
            Err(e) => malformed(None, e),
        };
        let encoded = serde_json::to_string(&response)?;

        writer.write_all(encoded.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        served += 1;
    }

    info!("Input closed after {} requests", served);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archiver;
    use crate::db::Database;
    use crate::storage::StorageRoot;
    use tempfile::tempdir;

    fn handler(root: &std::path::Path) -> Handler {
        let db = Database::open_in_memory().unwrap();
        db.initialize(None).unwrap();
        Handler::new(db, Archiver::new(StorageRoot::at(root)))
    }

    fn responses(output: &[u8]) -> Vec<Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_handle_line_keeps_id() {
        let dir = tempdir().unwrap();
        let handler = handler(dir.path());

        let response = handle_line(&handler, r#"{"id": 3, "request": {"command": "get-media-types"}}"#);
        assert_eq!(response.id, Some(3));
        assert_eq!(response.result.as_array().unwrap().len(), 4);

        let response = handle_line(&handler, r#"{"id": 4, "request": {"command": "drop-tables"}}"#);
        assert_eq!(response.id, Some(4));
        assert_eq!(response.result["success"], json!(false));

        let response = handle_line(&handler, "not json");
        assert_eq!(response.id, None);
        assert_eq!(response.result["success"], json!(false));
    }

    #[tokio::test]
    async fn test_serve_survives_invalid_utf8() {
        let dir = tempdir().unwrap();
        let handler = handler(dir.path());

        let mut input = br#"{"id": 1, "request": {"command": "get-tags", "x": ""#.to_vec();
        input.extend_from_slice(&[0xff, 0xfe]);
        input.extend_from_slice(b"\"}}\n");
        input.extend_from_slice(br#"{"id": 2, "request": {"command": "get-tags"}}"#);

        let mut output = Vec::new();
        serve(&handler, input.as_slice(), &mut output).await.unwrap();

        let frames = responses(&output);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], Value::Null);
        assert_eq!(frames[0]["result"]["success"], json!(false));
        assert_eq!(frames[1], json!({ "id": 2, "result": [] }));
    }

    #[tokio::test]
    async fn test_serve_until_eof() {
        let dir = tempdir().unwrap();
        let handler = handler(dir.path());

        let input = concat!(
            r#"{"id": 1, "request": {"command": "add-collection", "name": "Trips"}}"#,
            "\n\n",
            "{broken\n",
            r#"{"id": 2, "request": {"command": "get-collections"}}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(&handler, input.as_bytes(), &mut output).await.unwrap();

        let frames = responses(&output);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["id"], json!(1));
        assert_eq!(frames[0]["result"]["success"], json!(true));
        assert_eq!(frames[1]["id"], Value::Null);
        assert_eq!(frames[1]["result"]["success"], json!(false));

        let names: Vec<&str> = frames[2]["result"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"General"));
        assert!(names.contains(&"Trips"));
    }
}
