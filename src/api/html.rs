/// Landing page. Polls the two JSON routes once a second and embeds the live feed.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Vision Node</title>
<style>
  body { font-family: sans-serif; margin: 1.5em; background: #111; color: #eee; }
  #feed { max-width: 100%; border: 1px solid #444; }
  .row { margin: 0.3em 0; }
  .label { color: #999; display: inline-block; width: 8em; }
  #detection.valid { color: #6f6; }
</style>
</head>
<body>
<h1>Vision Node</h1>
<div class="row"><span class="label">Status</span><span id="status">-</span></div>
<div class="row"><span class="label">Network</span><span id="network">-</span></div>
<div class="row"><span class="label">Detection</span><span id="detection">-</span></div>
<div class="row"><span class="label">Box</span><span id="bbox">-</span></div>
<img id="feed" src="/stream" alt="live feed">
<script>
async function poll() {
  try {
    const s = await (await fetch('/api/status')).json();
    document.getElementById('status').textContent = s.status;
    document.getElementById('network').textContent =
      s.wifi_connected ? s.ip_address : 'offline';
    const d = await (await fetch('/api/detection')).json();
    const det = document.getElementById('detection');
    if (d.valid) {
      det.textContent = d.device_name + ' (' + Math.round(d.confidence * 100) + '%)';
      det.className = 'valid';
      document.getElementById('bbox').textContent =
        d.x + ',' + d.y + ' ' + d.width + 'x' + d.height;
    } else {
      det.textContent = 'none';
      det.className = '';
      document.getElementById('bbox').textContent = '-';
    }
  } catch (e) {
    document.getElementById('status').textContent = 'unreachable';
  }
}
setInterval(poll, 1000);
poll();
</script>
</body>
</html>
"#;
