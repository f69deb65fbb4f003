// i18n.rs
//
// Runtime string tables:
// - assets/i18n/<lang>.json, or
// - assets/i18n.json (single file, format: { "<lang>": { "key": "value" } })
// - English is compiled in as the fallback, so the app works without assets.
// - Lookup: tr("key") / tr_with("key", &[("name", ...)]) with {name} placeholders
//
// Language selection: --lang <code>, then ROOM_LANG, then "en".

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

pub const FALLBACK_LANG: &str = "en";
const EMBEDDED_EN: &str = include_str!("../assets/i18n/en.json");

/// (code, native name) offered in the Language menu.
pub const LANGUAGES: [(&str, &str); 3] = [("en", "English"), ("sk", "Slovenčina"), ("zh-Hans", "简体中文")];

#[derive(Debug, Clone)]
pub struct I18n {
    map: HashMap<String, String>,
    fallback_map: HashMap<String, String>,
}

impl I18n {
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.map
            .get(key)
            .or_else(|| self.fallback_map.get(key))
            .map(String::as_str)
    }
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn parse_map(text: &str) -> Option<HashMap<String, String>> {
    serde_json::from_str(text).ok()
}

fn load_json_map(path: &Path) -> Option<HashMap<String, String>> {
    parse_map(&std::fs::read_to_string(path).ok()?)
}

fn load_multi_lang_json(path: &Path, lang: &str) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut all: HashMap<String, HashMap<String, String>> = serde_json::from_str(&text).ok()?;
    all.remove(lang)
}

/// `<exe_dir>/assets/<rel>` first, then `./assets/<rel>`.
fn find_asset(rel: &Path) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    exe_dir
        .into_iter()
        .chain(std::iter::once(PathBuf::new()))
        .map(|base| base.join("assets").join(rel))
        .find(|p| p.exists())
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    if let Some(m) = find_asset(&Path::new("i18n").join(format!("{}.json", lang))).and_then(|p| load_json_map(&p)) {
        return m;
    }
    if let Some(m) = find_asset(Path::new("i18n.json")).and_then(|p| load_multi_lang_json(&p, lang)) {
        return m;
    }
    if lang == FALLBACK_LANG {
        return parse_map(EMBEDDED_EN).unwrap_or_default();
    }

    log::warn!("no string table for language {:?}", lang);
    HashMap::new()
}

/// Initialize global i18n. Later calls switch the language.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let map = load_lang(&lang);
    let fallback_map = if lang == FALLBACK_LANG {
        map.clone()
    } else {
        load_lang(FALLBACK_LANG)
    };

    log::debug!("language {} ({} strings)", lang, map.len());
    let i = I18n { map, fallback_map };

    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else {
        let _ = I18N.set(RwLock::new(i));
    }
}

/// Localized text; the key itself when missing.
pub fn tr(key: &str) -> String {
    I18N.get()
        .and_then(|l| l.read().ok())
        .and_then(|i| i.lookup(key).map(str::to_string))
        .unwrap_or_else(|| key.to_string())
}

/// Localized text with `{name}` placeholders substituted. Unknown ones are kept.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    substitute(tr(key), args)
}

fn substitute(mut s: String, args: &[(&str, String)]) -> String {
    for (k, v) in args {
        s = s.replace(&format!("{{{}}}", k), v);
    }
    s
}

pub fn resolve_lang(cli_lang: Option<&str>) -> String {
    if let Some(l) = cli_lang {
        return l.to_string();
    }
    match std::env::var("ROOM_LANG") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => FALLBACK_LANG.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table_parses() {
        let map = parse_map(EMBEDDED_EN).expect("en.json must be a flat string map");
        assert!(map.contains_key("app.title"));
        assert!(map.contains_key("menu.open_image"));
    }

    #[test]
    fn test_lookup_falls_back() {
        let i = I18n {
            map: HashMap::from([("a".to_string(), "A".to_string())]),
            fallback_map: HashMap::from([("b".to_string(), "B".to_string())]),
        };
        assert_eq!(i.lookup("a"), Some("A"));
        assert_eq!(i.lookup("b"), Some("B"));
        assert_eq!(i.lookup("c"), None);
    }

    #[test]
    fn test_substitute_keeps_unknown_placeholders() {
        let s = substitute("{w}x{h} {other}".to_string(), &[("w", "800".into()), ("h", "600".into())]);
        assert_eq!(s, "800x600 {other}");
    }

    #[test]
    fn test_cli_lang_wins() {
        assert_eq!(resolve_lang(Some("sk")), "sk");
    }
}
