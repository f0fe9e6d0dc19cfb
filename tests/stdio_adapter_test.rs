//! Black-box test of `StdioAdapter` against a real child process: a tiny
//! Node.js script acting as a canned MCP server, written to a temp file
//! per the teacher's `tempfile`-backed process test convention.

use std::collections::HashMap;
use std::io::Write;

use mcp_router::rpc::JsonRpcRequest;
use mcp_router::transport::stdio::StdioAdapter;
use mcp_router::transport::BackendTransport;

fn write_echo_server() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().expect("create temp script");
    file.write_all(
        br#"
const readline = require('readline');
const rl = readline.createInterface({ input: process.stdin });
rl.on('line', (line) => {
  const req = JSON.parse(line);
  process.stdout.write(JSON.stringify({ jsonrpc: "2.0", id: req.id, result: { echoed: req.method } }) + "\n");
});
"#,
    )
    .expect("write script");
    file
}

#[tokio::test]
async fn call_returns_backend_response() {
    let script = write_echo_server();
    let adapter = StdioAdapter::new("node-echo", vec!["node".to_string(), script.path().to_string_lossy().to_string()], HashMap::new());

    adapter.start().await.expect("start node server");

    let request = JsonRpcRequest::new(Some(serde_json::json!(1)), "tools/list", None);
    let response = adapter.call(request).await.expect("call succeeds");

    adapter.stop().await;

    assert_eq!(response.result.unwrap()["echoed"], "tools/list");
}

#[tokio::test]
async fn healthy_after_start_unhealthy_after_stop() {
    let script = write_echo_server();
    let adapter = StdioAdapter::new("node-echo-2", vec!["node".to_string(), script.path().to_string_lossy().to_string()], HashMap::new());

    adapter.start().await.expect("start node server");
    assert!(adapter.is_healthy());

    adapter.stop().await;
    assert!(!adapter.is_healthy());
}
