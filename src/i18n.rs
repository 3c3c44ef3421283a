// ==========================================
// 文件导入管道 - 文案 (i18n)
// ==========================================
// 职责: 导入消息、比对消息、通知正文的多语言取值
// 语言: en（默认）/ zh-CN，由运行参数 notify/locale 选择
// 说明: rust_i18n::i18n! 宏在 lib.rs 中初始化，文案文件位于 locales/
// ==========================================

/// 支持的语言代码
pub const SUPPORTED_LOCALES: &[&str] = &["en", "zh-CN"];

pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 切换语言（不校验代码，未知语言回退到 en 文案）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 按运行参数切换语言
///
/// # 返回
/// - true: 已切换
/// - false: 不支持的语言代码，保持当前语言
pub fn apply_locale(locale: &str) -> bool {
    let locale = locale.trim();
    match SUPPORTED_LOCALES.iter().find(|l| l.eq_ignore_ascii_case(locale)) {
        Some(supported) => {
            set_locale(supported);
            tracing::info!(locale = %supported, "通知语言已切换");
            true
        }
        None => {
            tracing::warn!(locale = %locale, current = %current_locale(), "不支持的语言代码，保持当前语言");
            false
        }
    }
}

/// 取文案
///
/// # 示例
/// ```no_run
/// use file_import_pipeline::i18n::t;
/// let msg = t("import.no_file");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 取文案并替换 `%{name}` 占位符
///
/// 文案中没有出现的参数被忽略；没有提供的占位符原样保留
///
/// # 示例
/// ```no_run
/// use file_import_pipeline::i18n::t_with_args;
/// let msg = t_with_args("import.validation_failed", &[("filename", "orders.xlsx")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    args.iter().fold(t(key), |text, (name, value)| {
        text.replace(&format!("%{{{}}}", name), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // locale 为进程级状态，相关测试串行执行
    static LOCALE_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_apply_locale() {
        let _guard = LOCALE_LOCK.lock().unwrap();
        assert!(apply_locale("zh-cn"));
        assert_eq!(current_locale(), "zh-CN");

        assert!(!apply_locale("fr"));
        assert_eq!(current_locale(), "zh-CN");

        assert!(apply_locale(" en "));
        assert_eq!(current_locale(), "en");
    }

    #[test]
    fn test_both_locales_have_import_messages() {
        let _guard = LOCALE_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(t("import.no_file"), "No file has been provided for the import.");

        set_locale("zh-CN");
        assert_eq!(t("import.no_file"), "未提供导入文件。");

        set_locale("en");
    }

    #[test]
    fn test_placeholders() {
        let _guard = LOCALE_LOCK.lock().unwrap();
        set_locale("en");
        let msg = t_with_args("import.file_not_found", &[("path", "/tmp/orders.csv")]);
        assert_eq!(msg, "File not found: /tmp/orders.csv");

        let msg = t_with_args(
            "comparison.unknown_comparison",
            &[("comparison", "valid_qty"), ("unused", "x")],
        );
        assert!(msg.contains("valid_qty"));
        assert!(msg.contains("%{dataset}"));
    }
}
