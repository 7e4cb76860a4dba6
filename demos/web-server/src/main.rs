//! Web host for the execution bridge.
//!
//! Run with: cargo run -p web-server
//!
//! Then open http://localhost:3000 in your browser. Every connection gets its
//! own worker backed by the reference interpreter.

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, response::Html, routing::get};
use scriptbridge_core::ArtifactExtractor;
use scriptbridge_testkit::MiniInterpreter;
use scriptbridge_transport::websocket::create_ws_router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn mini() -> (MiniInterpreter, Vec<Box<dyn ArtifactExtractor>>) {
    let interpreter = MiniInterpreter::new();
    let extractors = interpreter.extractors();
    (interpreter, extractors)
}

type Factory = fn() -> (MiniInterpreter, Vec<Box<dyn ArtifactExtractor>>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(Arc::new(mini as Factory)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Script Bridge</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        textarea, pre {
            width: 100%;
            box-sizing: border-box;
            background: #111;
            color: #d4d4d4;
            font-family: Menlo, Monaco, "Courier New", monospace;
            font-size: 14px;
            padding: 8px;
        }
        textarea { height: 220px; }
        .stderr { color: #e88; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>Script Bridge</h1>
    <div class="status" id="status">Connecting...</div>
    <textarea id="code">name = input('Your name? ')
print('hello', name)
plot(name)
send_result({'greeted': name})</textarea>
    <p>
        <button id="run" disabled>Run</button>
        <button id="reset" disabled>Reset</button>
    </p>
    <pre id="stdout"></pre>
    <pre id="stderr" class="stderr"></pre>
    <pre id="result"></pre>
    <pre id="artifacts"></pre>

    <script>
        const status = document.getElementById('status');
        const runButton = document.getElementById('run');
        const resetButton = document.getElementById('reset');
        const out = (id, text) => { document.getElementById(id).textContent = text; };
        let ws;

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                status.textContent = 'Connected';
                status.className = 'status connected';
                ws.send(JSON.stringify({ type: 'init' }));
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                runButton.disabled = resetButton.disabled = true;
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.type === 'ready') {
                    runButton.disabled = resetButton.disabled = false;
                } else if (msg.type === 'input_required') {
                    const answer = window.prompt(msg.prompt);
                    ws.send(JSON.stringify({ type: 'input_response', input: answer ?? '' }));
                } else if (msg.type === 'result') {
                    const o = msg.outcome;
                    out('stdout', o.stdout);
                    out('stderr', [o.stderr, o.serialization_error].filter(Boolean).join('\n'));
                    out('result', o.result_wire_text ?? '(no result)');
                    out('artifacts', o.artifacts.map(a => `${a.kind} (${a.payload.length} chars)`).join('\n'));
                    runButton.disabled = false;
                } else if (msg.type === 'error') {
                    out('stderr', `[Error: ${msg.message}]`);
                    runButton.disabled = false;
                }
            };
        }

        runButton.onclick = () => {
            runButton.disabled = true;
            ['stdout', 'stderr', 'result', 'artifacts'].forEach(id => out(id, ''));
            ws.send(JSON.stringify({
                type: 'execute',
                code: document.getElementById('code').value,
                filename: 'editor.py'
            }));
        };

        resetButton.onclick = () => ws.send(JSON.stringify({ type: 'reset' }));

        connect();
    </script>
</body>
</html>
"#;
