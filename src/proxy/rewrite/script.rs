//! Frame protection script injected into proxied HTML

use super::super::endpoint::ProxyEndpoint;

const ENDPOINT_PLACEHOLDER: &str = "__FRAMEGATE_ENDPOINT__";

const PROTECTION_SCRIPT: &str = r#"<script data-framegate="protect">
(function () {
  var ENDPOINT = __FRAMEGATE_ENDPOINT__;
  function route(url) {
    try {
      if (typeof url !== 'string') { url = String(url); }
      if (url.indexOf(ENDPOINT) === 0) { return url; }
      if (url.indexOf('//') === 0) { url = location.protocol + url; }
      if (/^https?:\/\//i.test(url)) {
        return ENDPOINT + '?url=' + encodeURIComponent(url);
      }
    } catch (e) {}
    return url;
  }
  function define(obj, prop, getter, setter) {
    try {
      Object.defineProperty(obj, prop, { configurable: true, get: getter, set: setter });
    } catch (e) {}
  }
  define(window, 'top', function () { return window.self; });
  define(window, 'parent', function () { return window.self; });
  define(window, 'frameElement', function () { return null; });
  define(document, 'domain', function () { return location.hostname; }, function () {});
  try {
    var hrefDesc = Object.getOwnPropertyDescriptor(Location.prototype, 'href');
    if (hrefDesc && hrefDesc.set) {
      define(Location.prototype, 'href', hrefDesc.get, function (v) { hrefDesc.set.call(this, route(v)); });
    }
    var assign = Location.prototype.assign;
    Location.prototype.assign = function (v) { return assign.call(this, route(v)); };
    var replace = Location.prototype.replace;
    Location.prototype.replace = function (v) { return replace.call(this, route(v)); };
  } catch (e) {}
  var open = window.open;
  window.open = function (url) {
    var args = Array.prototype.slice.call(arguments);
    if (args.length) { args[0] = route(url); }
    return open.apply(window, args);
  };
  if (window.fetch) {
    var fetch = window.fetch;
    window.fetch = function (input, init) {
      if (typeof input === 'string' || input instanceof URL) { input = route(input); }
      return fetch.call(window, input, init);
    };
  }
  var xhrOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, url) {
    var args = Array.prototype.slice.call(arguments);
    args[1] = route(url);
    return xhrOpen.apply(this, args);
  };
})();
</script>"#;

/// Render the protection script bound to `endpoint`
pub fn protection_script(endpoint: &ProxyEndpoint) -> String {
    // A JSON string literal is a valid JS string literal; escape `</` so the
    // endpoint can never close the script element.
    let literal = serde_json::Value::String(endpoint.as_str().to_string())
        .to_string()
        .replace("</", "<\\/");
    PROTECTION_SCRIPT.replace(ENDPOINT_PLACEHOLDER, &literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_binds_endpoint() {
        let script = protection_script(&ProxyEndpoint::new("http://localhost:3000/proxy"));

        assert!(script.starts_with("<script"));
        assert!(script.ends_with("</script>"));
        assert!(script.contains(r#"var ENDPOINT = "http://localhost:3000/proxy";"#));
        assert!(!script.contains(ENDPOINT_PLACEHOLDER));
    }

    #[test]
    fn test_script_covers_navigation_apis() {
        let script = protection_script(&ProxyEndpoint::new("http://localhost:3000/proxy"));
        for api in [
            "'top'",
            "'parent'",
            "'frameElement'",
            "'domain'",
            "Location.prototype.assign",
            "Location.prototype.replace",
            "window.open",
            "window.fetch",
            "XMLHttpRequest.prototype.open",
        ] {
            assert!(script.contains(api), "missing {}", api);
        }
    }

    #[test]
    fn test_script_escapes_endpoint() {
        let script = protection_script(&ProxyEndpoint::new("http://x/</script><b>"));
        assert!(script.contains(r#""http://x/<\/script><b>""#));
        assert_eq!(script.matches("</script>").count(), 1);
    }
}
