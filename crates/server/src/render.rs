//! Text and HTML rendering for the feed UI.

use aletheia_core::{FeedEntry, VerificationStatus};

/// Everything the annotated plain-text view shows above the body
pub struct AnswerHeader<'a> {
    pub name: &'a str,
    pub when: &'a str,
    pub size: u64,
    pub status: VerificationStatus,
    pub signature_present: bool,
    pub fingerprint: &'a str,
}

/// Plain-text artifact view with a provenance header
pub fn annotated_answer(header: &AnswerHeader<'_>, body: &str) -> String {
    let presence = if header.signature_present {
        "present"
    } else {
        "missing"
    };
    format!(
        "--- Aletheia Answer ---\n\
         file: {name}\n\
         time: {when}\n\
         bytes: {size}\n\
         signature: {status} ({presence})\n\
         signer key: {fingerprint}\n\
         download: /ui/answer/{name}/download | sig: /ui/answer/{name}/download.sig\n\
         -----------------------\n\n\
         {body}",
        name = header.name,
        when = header.when,
        size = header.size,
        status = header.status,
        presence = presence,
        fingerprint = header.fingerprint,
        body = body,
    )
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn badge(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Verified => r#"<span class="badge ok">verified</span>"#,
        VerificationStatus::Invalid => r#"<span class="badge bad">invalid</span>"#,
        VerificationStatus::Unknown => r#"<span class="badge unknown">unknown</span>"#,
    }
}

fn card(entry: &FeedEntry) -> String {
    let name = escape_html(&entry.name);
    format!(
        r#"
    <div class="card">
      <div class="row">
        <div class="ts">{when}</div>
        <div class="spacer"></div>
        {badge}
      </div>
      <div class="name">{name}</div>
      <div class="preview">{preview}</div>
      <div class="footer">
        <button class="btn" data-name="{name}" onclick="openAnswer(this.dataset.name)">Open</button>
        <a class="btn ghost" href="/ui/answer/{name}/raw">Raw</a>
        <a class="btn ghost" href="/ui/answer/{name}/download">Download</a>
        <a class="btn ghost" href="/ui/answer/{name}/download.sig">Sig</a>
      </div>
    </div>"#,
        when = escape_html(&entry.when),
        badge = badge(entry.status),
        name = name,
        preview = escape_html(&entry.preview),
    )
}

/// Full feed page. Reloads itself whenever `/ui/events` emits.
pub fn feed_page(entries: &[FeedEntry]) -> String {
    let cards = if entries.is_empty() {
        "<p>No answers found.</p>".to_string()
    } else {
        entries.iter().map(card).collect::<Vec<_>>().join("\n")
    };

    PAGE_TEMPLATE.replace("{CARDS}", &cards)
}

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Recent Answers</title>
<style>
  body { background:#0d1020; color:#d9def1; font:14px/1.45 system-ui, sans-serif; margin:0; }
  .wrap { max-width:1100px; margin:40px auto; padding:0 16px; }
  h1 { margin:0 0 20px; font-size:22px; }
  .grid { display:grid; grid-template-columns:repeat(auto-fit, minmax(320px, 1fr)); gap:16px; }
  .card { background:#1b2040; border-radius:14px; padding:14px; }
  .row { display:flex; align-items:center; gap:8px; }
  .spacer { flex:1; }
  .ts { color:#9aa3b2; font-size:12px; }
  .name { font-weight:600; margin:10px 0 6px; }
  .preview { font-size:13px; white-space:pre-wrap; }
  .footer { display:flex; gap:10px; margin-top:10px; }
  .btn { background:#7c4dff; color:#fff; border:none; padding:8px 12px; border-radius:10px; font-weight:600; cursor:pointer; text-decoration:none; }
  .btn.ghost { background:transparent; border:1px solid #586; color:#d9def1; }
  .badge { padding:4px 8px; border-radius:999px; font-size:12px; font-weight:700; }
  .badge.ok { background:#1e3f2a; color:#9cffbf; }
  .badge.bad { background:#3f1e1e; color:#ffb0b0; }
  .badge.unknown { background:#2b2b3a; color:#d0d0df; }
  dialog { border:none; border-radius:14px; background:#121429; color:#e2e6ff; width:min(900px, 90vw); }
  .modal-head { display:flex; align-items:center; gap:10px; padding:10px 14px; border-bottom:1px solid #2a2d48; }
  .modal-body { padding:14px; white-space:pre-wrap; font-family:ui-monospace, monospace; font-size:13px; }
  .close { margin-left:auto; }
</style>
</head>
<body>
  <div class="wrap">
    <h1>Recent Answers</h1>
    <div class="grid">{CARDS}</div>
  </div>

  <dialog id="mb">
    <div class="modal-head">
      <strong id="mtitle">Answer</strong>
      <button class="btn ghost close" onclick="mb.close()">Close</button>
    </div>
    <div class="modal-body" id="mbody"></div>
  </dialog>

  <script>
    const mb = document.getElementById('mb');
    const title = document.getElementById('mtitle');
    const bodyEl = document.getElementById('mbody');
    async function openAnswer(name) {
      title.textContent = name;
      bodyEl.textContent = 'Loading...';
      mb.showModal();
      try {
        const r = await fetch('/ui/answer/' + encodeURIComponent(name));
        bodyEl.textContent = await r.text();
      } catch (err) {
        bodyEl.textContent = 'Failed: ' + err;
      }
    }
    try {
      const es = new EventSource('/ui/events');
      es.onmessage = () => location.reload();
    } catch (e) {}
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn entry(name: &str, preview: &str, status: VerificationStatus) -> FeedEntry {
        FeedEntry {
            name: name.to_string(),
            when: "2025-01-02 03:04:05".to_string(),
            modified: Local::now(),
            size: 3,
            preview: preview.to_string(),
            status,
        }
    }

    #[test]
    fn test_annotated_answer_layout() {
        let text = annotated_answer(
            &AnswerHeader {
                name: "a.answer.txt",
                when: "2025-01-02 03:04:05",
                size: 5,
                status: VerificationStatus::Unknown,
                signature_present: false,
                fingerprint: "unknown",
            },
            "hello",
        );
        assert_eq!(
            text,
            "--- Aletheia Answer ---\n\
             file: a.answer.txt\n\
             time: 2025-01-02 03:04:05\n\
             bytes: 5\n\
             signature: unknown (missing)\n\
             signer key: unknown\n\
             download: /ui/answer/a.answer.txt/download | sig: /ui/answer/a.answer.txt/download.sig\n\
             -----------------------\n\
             \n\
             hello"
        );
    }

    #[test]
    fn test_feed_page_escapes_preview() {
        let page = feed_page(&[entry(
            "a.answer.txt",
            "<script>alert('x')</script>",
            VerificationStatus::Verified,
        )]);
        assert!(page.contains("&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"));
        assert!(!page.contains("<script>alert"));
        assert!(page.contains(r#"<span class="badge ok">verified</span>"#));
        assert!(page.contains("/ui/answer/a.answer.txt/download.sig"));
    }

    #[test]
    fn test_feed_page_empty() {
        assert!(feed_page(&[]).contains("No answers found."));
    }
}
