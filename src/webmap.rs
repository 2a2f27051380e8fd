//! Self-contained Leaflet pages: markers, marker clusters and heat maps.
//!
//! Layer data is serialized to JSON and embedded in the page; the page
//! itself only loads Leaflet and its plugins from a CDN.

use anyhow::{Context, Result};
use geo::Point;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerStyle {
    /// Leaflet's default pin
    Pin,
    Dot { color: String },
    Image { url: String, size: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub popup: Option<String>,
    pub style: MarkerStyle,
}

impl Marker {
    pub fn new(location: Point<f64>, style: MarkerStyle) -> Self {
        Marker {
            lat: location.y(),
            lon: location.x(),
            popup: None,
            style,
        }
    }

    /// Popup text, shown as plain text.
    pub fn with_popup(mut self, text: impl AsRef<str>) -> Self {
        self.popup = Some(escape_html(text.as_ref()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Markers { markers: Vec<Marker> },
    Cluster { markers: Vec<Marker> },
    Heat {
        points: Vec<[f64; 2]>,
        radius: u32,
        blur: u32,
        gradient: BTreeMap<String, String>,
    },
}

impl Layer {
    /// Heat map layer with radius 10, blur 5 and a blue-lime-red gradient.
    pub fn heat(points: &[Point<f64>]) -> Self {
        let gradient = [("0.4", "blue"), ("0.65", "lime"), ("1", "red")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Layer::Heat {
            points: points.iter().map(|p| [p.y(), p.x()]).collect(),
            radius: 10,
            blur: 5,
            gradient,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebMap {
    pub title: String,
    pub center: [f64; 2],
    pub zoom: u8,
    pub layers: Vec<Layer>,
}

impl WebMap {
    pub fn new(title: impl Into<String>, center: Point<f64>, zoom: u8) -> Self {
        WebMap {
            title: title.into(),
            center: [center.y(), center.x()],
            zoom,
            layers: Vec::new(),
        }
    }

    pub fn add(&mut self, layer: Layer) -> &mut Self {
        self.layers.push(layer);
        self
    }

    pub fn marker_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| match l {
                Layer::Markers { markers } | Layer::Cluster { markers } => markers.len(),
                Layer::Heat { .. } => 0,
            })
            .sum()
    }

    pub fn to_html(&self) -> Result<String> {
        let data = serde_json::to_string(self).context("Failed to serialize map layers")?;
        // keep the payload from closing the <script> element
        let data = data.replace("</", "<\\/");
        Ok(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css" crossorigin="anonymous" referrerpolicy="no-referrer" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js" crossorigin="anonymous" referrerpolicy="no-referrer"></script>
  <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.4.1/dist/MarkerCluster.css" />
  <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.4.1/dist/MarkerCluster.Default.css" />
  <script src="https://unpkg.com/leaflet.markercluster@1.4.1/dist/leaflet.markercluster.js"></script>
  <script src="https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js"></script>
  <style>
    html, body, #map {{ height: 100%; margin: 0; }}
  </style>
</head>
<body>
  <div id="map"></div>
  <script>
    const page = {data};
    const map = L.map('map').setView(page.center, page.zoom);
    L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
      maxZoom: 19,
      attribution: '&copy; OpenStreetMap contributors'
    }}).addTo(map);

    function marker(m) {{
      let layer;
      if (m.style.kind === 'dot') {{
        layer = L.circleMarker([m.lat, m.lon], {{ radius: 8, color: m.style.color, fillColor: m.style.color, fillOpacity: 0.9 }});
      }} else if (m.style.kind === 'image') {{
        const s = m.style.size;
        layer = L.marker([m.lat, m.lon], {{ icon: L.icon({{ iconUrl: m.style.url, iconSize: [s, s] }}) }});
      }} else {{
        layer = L.marker([m.lat, m.lon]);
      }}
      if (m.popup !== null) layer.bindPopup(m.popup);
      return layer;
    }}

    for (const layer of page.layers) {{
      if (layer.type === 'markers') {{
        layer.markers.forEach(m => marker(m).addTo(map));
      }} else if (layer.type === 'cluster') {{
        const group = L.markerClusterGroup();
        layer.markers.forEach(m => group.addLayer(marker(m)));
        map.addLayer(group);
      }} else if (layer.type === 'heat') {{
        L.heatLayer(layer.points, {{ radius: layer.radius, blur: layer.blur, gradient: layer.gradient }}).addTo(map);
      }}
    }}
  </script>
</body>
</html>
"#,
            title = escape_html(&self.title),
            data = data,
        ))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
        let html = self.to_html()?;
        fs::write(path, html).with_context(|| format!("Failed to write map {:?}", path))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
