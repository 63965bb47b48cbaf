use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FetchReport, OrderReport};
use crate::scene::{Scene, SceneCollection};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_order(report: &OrderReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_fetch(report: &FetchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Print one line per scene with the requested columns. `date`, `id`, and
/// `overlap` are built in; anything else resolves against the property map.
pub fn print_scenes(collection: &SceneCollection, fields: &[String]) {
    println!("{}", fields.join("\t"));
    for scene in &collection.scenes {
        let row = fields
            .iter()
            .map(|field| scene_field(scene, field))
            .collect::<Vec<_>>()
            .join("\t");
        println!("{row}");
    }
}

fn scene_field(scene: &Scene, field: &str) -> String {
    match field {
        "id" => scene.id.clone(),
        "date" => scene.datetime.date_naive().to_string(),
        "datetime" => scene.datetime.to_rfc3339(),
        "overlap" => scene
            .overlap
            .map(|overlap| format!("{overlap:.3}"))
            .unwrap_or_else(|| "-".to_string()),
        key => scene
            .properties
            .get(key)
            .map(|value| match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "-".to_string()),
    }
}
