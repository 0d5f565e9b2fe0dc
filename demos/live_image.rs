use std::path::PathBuf;

use gemini_live::types::{InlineData, Part};
use tracing_subscriber::EnvFilter;

// 2x2 black PNG
const BLACK_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAIAAAACCAIAAAD91JpzAAAAC0lEQVR4nGNgQAYAAA4AAamRc7EAAAAASUVORK5CYII=";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let out_dir: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "live_images".into())
        .into();
    std::fs::create_dir_all(&out_dir)?;

    let client = gemini_live::Client::from_env()?;
    let mut connect = client.live("gemini-2.0-flash-exp");
    // 10 seconds at the default 100ms interval
    connect.max_polls(100);
    let mut session = connect.await?;

    let parts = vec![
        Part::text("This image is just black, can you see it?"),
        Part {
            inline_data: Some(InlineData::new("image/png", BLACK_PNG)),
            ..Default::default()
        },
    ];

    let result = async {
        session.send_parts(parts).await?;
        session.collect_turn().await
    }
    .await;

    let turn = match result {
        Ok(turn) => turn,
        Err(gemini_live::Error::TurnTimeout { attempts }) => {
            eprintln!("Warning: timed out waiting for complete turn after {attempts} polls");
            session.close().await?;
            return Ok(());
        }
        Err(e) => {
            session.close().await?;
            return Err(e.into());
        }
    };

    println!("Image turn response: {} messages", turn.len());
    println!("{}", turn.text());

    let written = turn
        .save_inline_data(|index, _| out_dir.join(format!("response_{index}.png")))
        .await?;
    for path in written {
        println!("Saved {}", path.display());
    }

    session.close().await?;
    Ok(())
}
