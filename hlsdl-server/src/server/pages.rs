use crate::task::{Task, TaskInfo};

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn status(info: &TaskInfo) -> &'static str {
    match (info.started, info.finished, info.error.is_empty()) {
        (_, true, false) => "failed",
        (_, true, true) => "finished",
        (true, false, _) => "downloading",
        (false, false, _) => "waiting",
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        escape_html(title)
    )
}

pub fn render_index(tasks: &[std::sync::Arc<Task>]) -> String {
    let mut rows = String::new();
    for task in tasks {
        let info = task.info();
        rows.push_str(&format!(
            "<tr><td><a href=\"/{id}/\">{id}</a></td><td>{filename}</td><td>{status}</td><td>{url}</td></tr>\n",
            id = task.id,
            filename = escape_html(&task.filename),
            status = status(&info),
            url = escape_html(&task.url),
        ));
    }
    let body = if rows.is_empty() {
        "<h1>Tasks</h1>\n<p>No tasks yet. Add one with <code>/add?url=...</code></p>".to_string()
    } else {
        format!(
            "<h1>Tasks</h1>\n<table>\n<tr><th>#</th><th>File</th><th>Status</th><th>URL</th></tr>\n{rows}</table>"
        )
    };
    layout("hlsdl", &body)
}

// Fields updated by the event stream script
const TASK_FIELDS: [&str; 7] = [
    "segment",
    "got_bytes",
    "downloaded_duration",
    "segments_count",
    "segments_duration",
    "status",
    "error",
];

const TASK_SCRIPT: &str = r#"<script>
const events = new EventSource(window.location.pathname);
events.onmessage = (event) => {
  const info = JSON.parse(event.data);
  const set = (id, value) => { document.getElementById(id).textContent = value; };
  set("segment", info.current_segment.num + " " + info.current_segment.url);
  set("got_bytes", info.got_bytes);
  set("downloaded_duration", info.downloaded_duration.toFixed(1));
  set("segments_count", info.segments_count);
  set("segments_duration", info.segments_duration.toFixed(1));
  set("error", info.error);
  if (info.finished) {
    set("status", info.error ? "failed" : "finished");
    events.close();
  } else {
    set("status", info.started ? "downloading" : "waiting");
  }
};
</script>"#;

pub fn render_task(task: &Task) -> String {
    let info = task.info();
    let values = [
        format!(
            "{} {}",
            info.current_segment.num,
            escape_html(&info.current_segment.url)
        ),
        info.got_bytes.to_string(),
        format!("{:.1}", info.downloaded_duration),
        info.segments_count.to_string(),
        format!("{:.1}", info.segments_duration),
        status(&info).to_string(),
        escape_html(&info.error),
    ];

    let mut body = format!(
        "<p><a href=\"/\">All tasks</a></p>\n<h1>{}</h1>\n<p>{}</p>\n",
        escape_html(&task.filename),
        escape_html(&task.url)
    );
    if !task.source.is_empty() {
        body.push_str(&format!("<p>Source: {}</p>\n", escape_html(&task.source)));
    }
    body.push_str("<dl>\n");
    for (field, value) in TASK_FIELDS.iter().zip(values) {
        body.push_str(&format!(
            "<dt>{}</dt><dd id=\"{field}\">{value}</dd>\n",
            field.replace('_', " ")
        ));
    }
    body.push_str("</dl>\n");
    body.push_str(TASK_SCRIPT);
    layout(&task.filename, &body)
}
