// fonts.rs — egui 字体: 找一个能覆盖界面语言的字体
//
// ab_glyph handles .ttc poorly, so .ttf/.otf come first; anything that
// fails to parse is skipped.

use std::path::PathBuf;

const ASSET_FONTS: &[&str] = &[
    "NotoSans-Regular.ttf",
    "NotoSansSC-Regular.otf",
    "NotoSansSC-Regular.ttf",
    "NotoSansCJK-Regular.ttc",
];

fn system_candidates() -> Vec<PathBuf> {
    let list: &[&str] = if cfg!(windows) {
        &[
            r"C:\Windows\Fonts\msyh.ttf",
            r"C:\Windows\Fonts\segoeui.ttf",
            r"C:\Windows\Fonts\arial.ttf",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/Library/Fonts/NotoSansSC-Regular.otf",
            "/System/Library/Fonts/PingFang.ttc",
        ]
    } else {
        &[
            "/usr/share/fonts/opentype/noto/NotoSansSC-Regular.otf",
            "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ]
    };
    list.iter().map(PathBuf::from).collect()
}

fn asset_candidates() -> Vec<PathBuf> {
    let mut bases = Vec::new();
    if let Some(dir) = std::env::current_exe().ok().and_then(|e| e.parent().map(|p| p.to_path_buf())) {
        bases.push(dir.join("assets").join("fonts"));
    }
    bases.push(PathBuf::from("assets").join("fonts"));

    bases
        .iter()
        .flat_map(|b| ASSET_FONTS.iter().map(move |f| b.join(f)))
        .collect()
}

fn load_font(path: &PathBuf) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    ab_glyph::FontRef::try_from_slice(&bytes).ok()?;
    Some(bytes)
}

/// Install the first usable font ahead of egui's defaults. egui's own
/// fonts stay as fallback when nothing is found.
pub fn install_ui_fonts(ctx: &egui::Context) {
    let found = asset_candidates()
        .into_iter()
        .chain(system_candidates())
        .find_map(|p| load_font(&p).map(|bytes| (p, bytes)));

    let Some((path, bytes)) = found else {
        log::warn!("{}", crate::i18n::tr("font.not_found"));
        return;
    };
    log::info!(
        "{}",
        crate::i18n::tr_with("font.using", &[("path", path.display().to_string())])
    );

    let mut fonts = egui::FontDefinitions::default();
    fonts
        .font_data
        .insert("ui".to_owned(), egui::FontData::from_owned(bytes));
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        if let Some(list) = fonts.families.get_mut(&family) {
            list.insert(0, "ui".to_owned());
        }
    }
    ctx.set_fonts(fonts);
}
