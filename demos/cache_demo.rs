use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use voco_rs::{
    AudioChunk, AudioRouter, CacheConfigBuilder, DriverConfig, Generation, ModelRegistry, Params,
    SynthesisDriver, SynthesisResult,
};

const SAMPLE_RATE: u32 = 24000;

/// Stand-in driver: one short sine tone per sentence.
struct ToneDriver {
    config: DriverConfig,
    loaded: bool,
}

impl SynthesisDriver for ToneDriver {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn load(&mut self) -> voco_rs::Result<()> {
        self.loaded = true;
        Ok(())
    }

    fn generate(&mut self, text: &str, params: &Params) -> voco_rs::Result<Generation> {
        self.ensure_loaded()?;
        let speed = params.get("speed").and_then(|v| v.as_f64()).unwrap_or(1.0) as f32;

        let chunks: Vec<voco_rs::Result<AudioChunk>> = text
            .split_inclusive(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|sentence| {
                let len = (sentence.len() as f32 * 800.0 / speed) as usize;
                let freq = 220.0 + (sentence.len() % 12) as f32 * 20.0;
                let samples = (0..len)
                    .map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.2)
                    .collect();
                Ok(AudioChunk {
                    graphemes: Some(sentence.to_string()),
                    phonemes: None,
                    audio: Some(SynthesisResult {
                        samples,
                        sample_rate: SAMPLE_RATE,
                    }),
                })
            })
            .collect();

        Ok(Generation::Chunks(Box::new(chunks.into_iter())))
    }

    fn unload(&mut self) -> voco_rs::Result<()> {
        self.loaded = false;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let registry = Arc::new(ModelRegistry::new());
    registry.register("tone", |config| {
        let driver: Box<dyn SynthesisDriver> = Box::new(ToneDriver {
            config,
            loaded: false,
        });
        Ok(driver)
    })?;

    let config = CacheConfigBuilder::default()
        .cache_dir(std::env::temp_dir().join("voco-demo-cache"))
        .max_size_mb(100u64)
        .ttl_seconds(3600u64)
        .build()?;
    let mut router = AudioRouter::with_cache(registry, config)?;
    router.load("tone", Some("tts"), Some("cpu"), None, Params::new())?;

    let text = "Hello world! This is a caching demonstration.";
    let mut params = Params::new();
    params.insert("voice".to_string(), "af_heart".into());

    let start = Instant::now();
    let Generation::Chunks(stream) = router.infer("tts", text, params.clone())? else {
        return Err("expected a fresh generation".into());
    };
    let mut samples = 0;
    for chunk in stream {
        let chunk = chunk?;
        if let Some(audio) = &chunk.audio {
            samples += audio.samples.len();
            println!(
                "  Chunk: {:?} -> {} samples",
                chunk.graphemes.unwrap_or_default(),
                audio.samples.len()
            );
        }
    }
    println!("First call (generated {} samples) in {:.2?}", samples, start.elapsed());

    let start = Instant::now();
    let cached = router.infer("tts", text, params.clone())?;
    println!("Second call (cached: {}) in {:.2?}", cached.is_audio(), start.elapsed());
    let audio = SynthesisResult::from_wav_bytes(&cached.into_bytes()?)?;
    audio.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved {:.2}s to output.wav", audio.duration_secs());

    if let Some(cache) = router.cache() {
        println!("Cache stats: {:?}", cache.stats()?);
    }

    params.insert("cache".to_string(), false.into());
    let start = Instant::now();
    router.infer("tts", text, params)?.into_bytes()?;
    println!("Third call (cache=false) in {:.2?}", start.elapsed());

    if let Some(cache) = router.cache() {
        cache.clear(None)?;
        println!("Cache cleared: {:?}", cache.stats()?);
    }

    router.unload_all();
    Ok(())
}
