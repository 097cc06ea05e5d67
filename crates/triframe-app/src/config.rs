// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use triframe_render::{RenderOptions, RenderSize};

use crate::cli::Args;

pub const CONFIG_FILE: &str = "triframe.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_vsync")]
    pub vsync: bool,
    #[serde(default = "default_diagnostics")]
    pub diagnostics: bool,
    #[serde(default)]
    pub warp: bool,
    /// 0 waits forever.
    #[serde(default)]
    pub frame_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: default_vsync(),
            diagnostics: default_diagnostics(),
            warp: false,
            frame_timeout_ms: 0,
        }
    }
}

impl RenderCfg {
    pub fn frame_timeout(&self) -> Option<Duration> {
        (self.frame_timeout_ms > 0).then(|| Duration::from_millis(self.frame_timeout_ms))
    }
}

fn default_title() -> String {
    String::from("triframe")
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_clear() -> [f32; 4] {
    [0.4, 0.6, 0.9, 1.0]
}
fn default_vsync() -> bool {
    true
}
fn default_diagnostics() -> bool {
    cfg!(debug_assertions)
}

pub fn load_cfg() -> AppCfg {
    load_cfg_from(Path::new(CONFIG_FILE))
}

pub fn load_cfg_from(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s),
        Err(_) => AppCfg::default(),
    }
}

pub fn parse_cfg(s: &str) -> AppCfg {
    toml::from_str::<AppCfg>(s).unwrap_or_else(|e| {
        warn!("ignoring malformed {CONFIG_FILE}: {e}");
        AppCfg::default()
    })
}

/// Everything the application needs to start, CLI over config.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub title: String,
    pub size: RenderSize,
    pub options: RenderOptions,
}

impl Settings {
    pub fn resolve(args: &Args, cfg: &AppCfg) -> Self {
        let size = RenderSize::new(
            args.width.unwrap_or(cfg.window.width),
            args.height.unwrap_or(cfg.window.height),
        );
        let options = RenderOptions {
            prefer_software: args.warp || cfg.render.warp,
            vsync: cfg.render.vsync,
            diagnostics: cfg.render.diagnostics,
            clear_color: cfg.render.clear_color,
            frame_timeout: cfg.render.frame_timeout(),
        };
        Settings {
            title: cfg.window.title.clone(),
            size,
            options,
        }
    }
}
