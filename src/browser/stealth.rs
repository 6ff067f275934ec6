//! Evasion scripts installed on every new document, so page scripts see a
//! stock Italian desktop Chrome rather than an automated one.

#![cfg_attr(not(feature = "browser"), allow(dead_code))]

pub const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver
    r#"
    Object.defineProperty(Navigator.prototype, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // window.chrome exists on real Chrome only
    r#"
    window.chrome = window.chrome || {};
    window.chrome.runtime = window.chrome.runtime || {};
    window.chrome.app = window.chrome.app || { isInstalled: false };
    window.chrome.csi = window.chrome.csi || function() { return {}; };
    window.chrome.loadTimes = window.chrome.loadTimes || function() { return {}; };
    "#,
    // Headless answers 'denied' for notifications while Notification says 'default'
    r#"
    const query = navigator.permissions.query.bind(navigator.permissions);
    navigator.permissions.query = (descriptor) =>
        descriptor && descriptor.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission, onchange: null })
            : query(descriptor);
    "#,
    // A desktop browser has the built-in PDF viewers
    r#"
    const fakePlugins = ['PDF Viewer', 'Chrome PDF Viewer', 'Chromium PDF Viewer'].map((name) => ({
        name,
        filename: 'internal-pdf-viewer',
        description: 'Portable Document Format',
        length: 1
    }));
    Object.defineProperty(Navigator.prototype, 'plugins', {
        get: () => fakePlugins,
        configurable: true
    });
    "#,
    // Locale and platform consistent with the user agent
    r#"
    Object.defineProperty(Navigator.prototype, 'languages', {
        get: () => ['it-IT', 'it', 'en-US', 'en'],
        configurable: true
    });
    Object.defineProperty(Navigator.prototype, 'platform', {
        get: () => 'Win32',
        configurable: true
    });
    "#,
    // chromedriver leaves cdc_* globals behind
    r#"
    for (const key of Object.keys(window)) {
        if (/^cdc_/.test(key)) {
            delete window[key];
        }
    }
    "#,
    // SwiftShader gives headless away through WebGL
    r#"
    const UNMASKED_VENDOR = 0x9245;
    const UNMASKED_RENDERER = 0x9246;
    const original = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(param) {
        if (param === UNMASKED_VENDOR) return 'Google Inc. (Intel)';
        if (param === UNMASKED_RENDERER) return 'ANGLE (Intel, Intel(R) UHD Graphics 620 Direct3D11 vs_5_0 ps_5_0)';
        return original.call(this, param);
    };
    "#,
];

/// All scripts as one document-start source. Each runs in its own scope
/// and a failure in one does not stop the others.
pub fn combined_source() -> String {
    STEALTH_SCRIPTS
        .iter()
        .map(|s| format!("(() => {{ try {{ {} }} catch (e) {{}} }})();", s.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
