fn main() {
    // Windows resource compilation for icon and manifest
    #[cfg(windows)]
    {
        let icon = "assets/rollcall_128.ico";
        if std::path::Path::new(icon).exists() {
            let mut res = winres::WindowsResource::new();
            res.set_icon(icon);
            res.compile().unwrap();
        }
    }
}
