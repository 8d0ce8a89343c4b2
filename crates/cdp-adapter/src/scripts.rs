//! Injected scripts used by the Chromium driver.
//!
//! Elements are addressed by tagging them with `data-tabflow-handle="<token>"`; frames
//! are addressed by the chain of iframe tokens walked from the top document. Every script
//! evaluates to `{ status, value? }` so the driver can map outcomes without exceptions.

use serde_json::Value;
use tabflow_core_types::{ElementHandle, PageHandle};

use crate::driver::Scope;

const PRELUDE: &str = r#"
const attr = 'data-tabflow-handle';
const docOf = (chain) => {
  let doc = document;
  for (const token of chain) {
    const frame = doc.querySelector('[' + attr + '="' + token + '"]');
    if (!frame) return null;
    let next = null;
    try { next = frame.contentDocument; } catch (e) { next = null; }
    if (!next) return null;
    doc = next;
  }
  return doc;
};
const find = (chain, token) => {
  const doc = docOf(chain);
  return doc ? doc.querySelector('[' + attr + '="' + token + '"]') : null;
};
const tag = (el, token) => {
  let current = el.getAttribute(attr);
  if (!current) {
    current = token;
    el.setAttribute(attr, current);
  }
  return current;
};
"#;

fn literal(value: impl Into<Value>) -> String {
    value.into().to_string()
}

fn chain(page: &PageHandle) -> String {
    literal(
        page.frames
            .iter()
            .map(|frame| Value::String(frame.0.clone()))
            .collect::<Vec<_>>(),
    )
}

fn wrap(body: &str) -> String {
    format!("(() => {{\n{}\n{}\n}})()", PRELUDE, body)
}

fn scope_root(scope: Scope<'_>) -> String {
    match scope {
        Scope::Page(page) => format!("docOf({})", chain(page)),
        Scope::Element(element) => {
            format!("find({}, {})", chain(&element.page), literal(element.id.0.as_str()))
        }
    }
}

/// Runs `body` with `el` bound to the element, or reports `not-found`.
fn on_element(element: &ElementHandle, body: &str) -> String {
    wrap(&format!(
        r#"const el = find({chain}, {token});
if (!el) return {{ status: 'not-found' }};
{body}"#,
        chain = chain(&element.page),
        token = literal(element.id.0.as_str()),
        body = body,
    ))
}

pub fn locate(scope: Scope<'_>, selector: &str, fresh: &str) -> String {
    wrap(&format!(
        r#"const root = {root};
if (!root) return {{ status: 'detached' }};
let el = null;
try {{ el = root.querySelector({selector}); }} catch (e) {{ return {{ status: 'invalid', value: String(e) }}; }}
if (!el) return {{ status: 'ok', value: null }};
return {{ status: 'ok', value: tag(el, {fresh}) }};"#,
        root = scope_root(scope),
        selector = literal(selector),
        fresh = literal(fresh),
    ))
}

pub fn locate_all(scope: Scope<'_>, selector: &str, fresh: &str) -> String {
    wrap(&format!(
        r#"const root = {root};
if (!root) return {{ status: 'detached' }};
let found = [];
try {{ found = Array.from(root.querySelectorAll({selector})); }} catch (e) {{ return {{ status: 'invalid', value: String(e) }}; }}
return {{ status: 'ok', value: found.map((el, i) => tag(el, {fresh} + '-' + i)) }};"#,
        root = scope_root(scope),
        selector = literal(selector),
        fresh = literal(fresh),
    ))
}

pub fn click(element: &ElementHandle) -> String {
    on_element(
        element,
        r#"el.scrollIntoView({ block: 'center', inline: 'center' });
el.click();
return { status: 'ok' };"#,
    )
}

pub fn focus(element: &ElementHandle, clear: bool) -> String {
    on_element(
        element,
        &format!(
            r#"el.scrollIntoView({{ block: 'center' }});
el.focus();
if ({clear}) {{
  if (typeof el.select === 'function') el.select();
  if ('value' in el) {{
    el.value = '';
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  }}
}}
return {{ status: 'ok' }};"#,
            clear = clear,
        ),
    )
}

pub fn text(element: &ElementHandle) -> String {
    on_element(
        element,
        r#"return { status: 'ok', value: el.innerText ?? el.textContent ?? '' };"#,
    )
}

pub fn attribute(element: &ElementHandle, name: &str) -> String {
    on_element(
        element,
        &format!(
            r#"return {{ status: 'ok', value: el.getAttribute({name}) }};"#,
            name = literal(name),
        ),
    )
}

pub fn property(element: &ElementHandle, name: &str) -> String {
    on_element(
        element,
        &format!(
            r#"const raw = el[{name}];
if (raw === undefined || raw === null) return {{ status: 'ok', value: null }};
let value = null;
try {{ value = JSON.parse(JSON.stringify(raw)); }} catch (e) {{ value = String(raw); }}
return {{ status: 'ok', value }};"#,
            name = literal(name),
        ),
    )
}

pub fn visible(element: &ElementHandle) -> String {
    on_element(
        element,
        r#"const view = el.ownerDocument.defaultView;
const style = view.getComputedStyle(el);
const rect = el.getBoundingClientRect();
const shown = rect.width > 0 && rect.height > 0
  && style.visibility !== 'hidden' && style.display !== 'none';
return { status: 'ok', value: shown };"#,
    )
}

pub fn parent(element: &ElementHandle, fresh: &str) -> String {
    on_element(
        element,
        &format!(
            r#"const parent = el.parentElement;
if (!parent) return {{ status: 'ok', value: null }};
return {{ status: 'ok', value: tag(parent, {fresh}) }};"#,
            fresh = literal(fresh),
        ),
    )
}

pub fn frame_document(element: &ElementHandle) -> String {
    on_element(
        element,
        r#"const name = el.tagName.toLowerCase();
if (name !== 'iframe' && name !== 'frame') return { status: 'not-frame' };
let doc = null;
try { doc = el.contentDocument; } catch (e) { doc = null; }
if (!doc) return { status: 'cross-origin' };
return { status: 'ok' };"#,
    )
}

/// Page-level coordinates of the element, accumulated through its frame chain.
pub fn element_clip(element: &ElementHandle) -> String {
    on_element(
        element,
        r#"el.scrollIntoView({ block: 'center' });
const rect = el.getBoundingClientRect();
let x = rect.left;
let y = rect.top;
let view = el.ownerDocument.defaultView;
while (view && view.frameElement) {
  const outer = view.frameElement.getBoundingClientRect();
  x += outer.left;
  y += outer.top;
  view = view.parent;
}
return { status: 'ok', value: {
  x: x + window.scrollX,
  y: y + window.scrollY,
  width: rect.width,
  height: rect.height,
} };"#,
    )
}

pub fn ready_state(page: &PageHandle) -> String {
    wrap(&format!(
        r#"const doc = docOf({chain});
if (!doc) return {{ status: 'detached' }};
return {{ status: 'ok', value: doc.readyState }};"#,
        chain = chain(page),
    ))
}

/// DOM size sample used to decide whether the layout stopped changing.
pub fn dom_sample(page: &PageHandle) -> String {
    wrap(&format!(
        r#"const doc = docOf({chain});
if (!doc || !doc.documentElement) return {{ status: 'detached' }};
return {{ status: 'ok', value: {{
  nodes: doc.getElementsByTagName('*').length,
  size: doc.documentElement.outerHTML.length,
}} }};"#,
        chain = chain(page),
    ))
}
