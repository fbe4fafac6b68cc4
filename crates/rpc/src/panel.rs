//! Static control panel served at `/`.
//!
//! A single page with three forms. Each form calls one API endpoint and prints
//! the raw JSON reply; there is no templating and no client state.

pub const CONTROL_PANEL_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>VICP Record Registry</title>
<style>
  body { font-family: Arial, sans-serif; max-width: 720px; margin: 40px auto; padding: 0 20px; }
  h3 { border-bottom: 2px solid #4CAF50; padding-bottom: 4px; }
  input { margin: 2px 4px 2px 0; }
  pre { background: #f4f4f4; padding: 10px; min-height: 2em; }
</style>
</head>
<body>
<h3>Register</h3>
<input id="s" placeholder="Site name"><input id="d" placeholder="Domain"><input id="o" placeholder="Owner">
<button onclick="reg()">Submit</button>
<h3>Lookup</h3>
<input id="q" placeholder="Record id or domain"><button onclick="lookup()">Query</button>
<h3>Administration</h3>
<input id="u" placeholder="User"><input id="pw" type="password" placeholder="Password">
<input id="did" placeholder="Record id (empty to list)">
<button onclick="admin()">Submit</button>
<pre id="p"></pre>
<script>
const show = async r => { p.textContent = JSON.stringify(await r.json(), null, 2) };
const postJson = (url, body) => fetch(url, {method: 'POST', headers: {'content-type': 'application/json'}, body: JSON.stringify(body)});
async function reg() { await show(await postJson('/api/register', {site: s.value, domain: d.value, owner: o.value})) }
async function lookup() {
  const v = q.value.trim();
  await show(await fetch(v.includes('.') ? '/api/query?domain=' + encodeURIComponent(v) : '/api/query?id=' + encodeURIComponent(v)));
}
async function admin() { await show(await postJson('/api/admin/delete', {user: u.value, pass: pw.value, id: did.value || null})) }
</script>
</body>
</html>
"#;
