//! Bounded-depth value formatter
//!
//! Renders script values the way Node's `util.inspect` does without
//! colors: single-line, strings quoted inside containers, nested values
//! past the depth limit collapsed to `[Object]` / `[Array]`.

use rquickjs::function::This;
use rquickjs::{Array, Coerced, Function, Object, Type, Value};

/// Arrays longer than this are cut with `... N more items`
pub const MAX_ARRAY_ITEMS: usize = 100;

/// Buffers longer than this are cut with `... N more bytes`
pub const MAX_BUFFER_BYTES: usize = 50;

/// Nesting levels rendered at most, whatever depth the caller asks for
pub const MAX_DEPTH: usize = 64;

/// Output past this many bytes is cut with `...`
pub const MAX_OUTPUT_LEN: usize = 1 << 20;

/* ===================== Entry Points ===================== */

/// Render a value as a top-level diagnostic argument
///
/// Strings print raw and other primitives are coerced to text; structured
/// values go through [`inspect`].
pub fn display(value: &Value<'_>, depth: usize) -> String {
    match value.type_of() {
        Type::String => value
            .as_string()
            .and_then(|s| s.to_string().ok())
            .unwrap_or_default(),
        Type::Uninitialized
        | Type::Undefined
        | Type::Bool
        | Type::Int
        | Type::Float
        | Type::BigInt => coerce(value),
        _ => inspect(value, depth),
    }
}

/// Join diagnostic arguments with single spaces
pub fn display_all(args: &[Value<'_>], depth: usize) -> String {
    args.iter()
        .map(|arg| display(arg, depth))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structural rendering of any value
///
/// Objects already open on the current path render as `[Circular *N]`
/// and the first occurrence gets a `<ref *N>` prefix.
pub fn inspect(value: &Value<'_>, depth: usize) -> String {
    let mut writer = Writer::new(depth);
    writer.value(value, 0);
    writer.out
}

/// `util.format` with `%s %d %i %f %j %o %O %%` placeholders
///
/// Arguments left over after the template are appended the way
/// [`display_all`] renders them.
pub fn format(args: &[Value<'_>], depth: usize) -> String {
    let Some(template) = args.first().filter(|v| v.is_string()) else {
        return display_all(args, depth);
    };
    let template = display(template, depth);
    if args.len() == 1 {
        return template;
    }

    let mut rest = args[1..].iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let Some(&spec) = chars.peek() else {
            out.push('%');
            break;
        };

        if spec == '%' {
            chars.next();
            out.push('%');
            continue;
        }

        if !matches!(spec, 's' | 'd' | 'i' | 'f' | 'j' | 'o' | 'O') {
            out.push('%');
            continue;
        }

        let Some(arg) = rest.next() else {
            // Placeholders without a matching argument stay literal
            out.push('%');
            continue;
        };
        chars.next();

        match spec {
            's' => out.push_str(&display(arg, depth)),
            'd' | 'i' | 'f' => out.push_str(&format_number(arg, spec)),
            'j' => out.push_str(&format_json(arg)),
            _ => out.push_str(&inspect(arg, depth)),
        }
    }

    for arg in rest {
        out.push(' ');
        out.push_str(&display(arg, depth));
    }

    out
}

/* ===================== Writer ===================== */

/// An object currently being rendered
struct Frame<'js> {
    object: Object<'js>,
    /// Offset in the output where its rendering starts
    start: usize,
    reference: Option<usize>,
}

struct Writer<'js> {
    out: String,
    depth: usize,
    path: Vec<Frame<'js>>,
    references: usize,
    truncated: bool,
}

impl<'js> Writer<'js> {
    fn new(depth: usize) -> Self {
        Self {
            out: String::new(),
            depth: depth.min(MAX_DEPTH),
            path: Vec::new(),
            references: 0,
            truncated: false,
        }
    }

    /// Containers nested deeper than the limit collapse to a tag
    fn collapsed(&self, level: usize) -> bool {
        level > self.depth
    }

    fn value(&mut self, value: &Value<'js>, level: usize) {
        if self.out.len() >= MAX_OUTPUT_LEN {
            if !self.truncated {
                self.truncated = true;
                self.out.push_str("...");
            }
            return;
        }

        match value.type_of() {
            Type::Uninitialized | Type::Undefined => self.out.push_str("undefined"),
            Type::Null => self.out.push_str("null"),
            Type::Bool | Type::Int => self.out.push_str(&coerce(value)),
            Type::Float => match value.as_float() {
                Some(f) if f == 0.0 && f.is_sign_negative() => self.out.push_str("-0"),
                _ => self.out.push_str(&coerce(value)),
            },
            Type::BigInt => {
                self.out.push_str(&coerce(value));
                self.out.push('n');
            }
            Type::String => {
                let text = value
                    .as_string()
                    .and_then(|s| s.to_string().ok())
                    .unwrap_or_default();
                push_quoted(&mut self.out, &text);
            }
            Type::Symbol => self.out.push_str(&symbol_text(value)),
            Type::Function | Type::Constructor => self.out.push_str(&function_text(value)),
            Type::Exception => self.out.push_str(&error_text(value, level)),
            Type::Promise => self.out.push_str("Promise {}"),
            _ => self.container(value, level),
        }
    }

    fn container(&mut self, value: &Value<'js>, level: usize) {
        let Some(object) = value.as_object() else {
            self.out.push_str(&coerce(value));
            return;
        };

        if let Some(index) = self.path.iter().position(|frame| frame.object == *object) {
            self.circular(index);
            return;
        }

        self.path.push(Frame {
            object: object.clone(),
            start: self.out.len(),
            reference: None,
        });
        match value.as_array() {
            Some(array) => self.array(array, level),
            None => self.object(object, level),
        }
        self.path.pop();
    }

    fn circular(&mut self, index: usize) {
        let reference = match self.path[index].reference {
            Some(reference) => reference,
            None => {
                self.references += 1;
                let reference = self.references;
                let tag = format!("<ref *{}> ", reference);
                self.out.insert_str(self.path[index].start, &tag);
                for frame in &mut self.path[index + 1..] {
                    frame.start += tag.len();
                }
                self.path[index].reference = Some(reference);
                reference
            }
        };
        self.out.push_str(&format!("[Circular *{}]", reference));
    }

    fn array(&mut self, array: &Array<'js>, level: usize) {
        let len = array.len();
        if len == 0 {
            self.out.push_str("[]");
            return;
        }
        if self.collapsed(level) {
            self.out.push_str("[Array]");
            return;
        }

        self.out.push_str("[ ");
        let shown = len.min(MAX_ARRAY_ITEMS);
        for i in 0..shown {
            if i > 0 {
                self.out.push_str(", ");
            }
            match array.get::<Value>(i) {
                Ok(item) => self.value(&item, level + 1),
                Err(_) => self.out.push_str("<error>"),
            }
        }
        if len > shown {
            let more = len - shown;
            self.out.push_str(&format!(
                ", ... {} more item{}",
                more,
                if more == 1 { "" } else { "s" }
            ));
        }
        self.out.push_str(" ]");
    }

    fn object(&mut self, object: &Object<'js>, level: usize) {
        let class = constructor_name(object);

        match class.as_deref() {
            Some("Date") => {
                self.out.push_str(&date_text(object));
                return;
            }
            Some("RegExp") => {
                self.out.push_str(&coerce(object.as_value()));
                return;
            }
            Some("Buffer") => {
                write_buffer(&mut self.out, object);
                return;
            }
            Some(kind @ ("Map" | "Set")) => {
                self.collection(object, kind, level);
                return;
            }
            Some(name) if name.ends_with("Array") && name != "Array" => {
                self.typed_array(object, name, level);
                return;
            }
            _ => {}
        }

        let prefix = match class.as_deref() {
            None => Some("[Object: null prototype]"),
            Some("Object") => None,
            Some(name) => Some(name),
        };

        let keys: Vec<String> = object.keys::<String>().filter_map(|k| k.ok()).collect();

        if !keys.is_empty() && self.collapsed(level) {
            self.out.push_str(&format!("[{}]", prefix.unwrap_or("Object")));
            return;
        }

        if let Some(prefix) = prefix {
            self.out.push_str(prefix);
            self.out.push(' ');
        }
        if keys.is_empty() {
            self.out.push_str("{}");
            return;
        }

        self.out.push_str("{ ");
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            push_key(&mut self.out, key);
            self.out.push_str(": ");
            match object.get::<_, Value>(key.as_str()) {
                Ok(value) => self.value(&value, level + 1),
                Err(_) => self.out.push_str("[Getter]"),
            }
        }
        self.out.push_str(" }");
    }

    fn typed_array(&mut self, object: &Object<'js>, name: &str, level: usize) {
        let len = byte_len(object);
        self.out.push_str(&format!("{}({}) ", name, len));
        if len == 0 {
            self.out.push_str("[]");
            return;
        }
        if self.collapsed(level) {
            self.out.push_str("[Array]");
            return;
        }

        self.out.push_str("[ ");
        let shown = len.min(MAX_ARRAY_ITEMS);
        for i in 0..shown {
            if i > 0 {
                self.out.push_str(", ");
            }
            match object.get::<_, Value>(i as u32) {
                Ok(item) => self.value(&item, level + 1),
                Err(_) => self.out.push_str("<error>"),
            }
        }
        if len > shown {
            self.out.push_str(&format!(", ... {} more items", len - shown));
        }
        self.out.push_str(" ]");
    }

    /// `Map(n) { k => v }` / `Set(n) { v }`
    fn collection(&mut self, object: &Object<'js>, kind: &str, level: usize) {
        let entries = object
            .ctx()
            .globals()
            .get::<_, Object>("Array")
            .and_then(|array| array.get::<_, Function>("from"))
            .and_then(|from| from.call::<_, Array>((object.clone(),)));

        let Ok(entries) = entries else {
            self.out.push_str(kind);
            self.out.push_str(" {}");
            return;
        };

        self.out.push_str(&format!("{}({}) ", kind, entries.len()));
        if entries.is_empty() {
            self.out.push_str("{}");
            return;
        }
        if self.collapsed(level) {
            self.out.push_str(&format!("[{}]", kind));
            return;
        }

        self.out.push_str("{ ");
        for (i, entry) in entries.iter::<Value>().take(MAX_ARRAY_ITEMS).enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let Ok(entry) = entry else {
                self.out.push_str("<error>");
                continue;
            };

            let pair = (kind == "Map").then(|| entry.as_array().cloned()).flatten();
            match pair {
                Some(pair) => {
                    if let Ok(key) = pair.get::<Value>(0) {
                        self.value(&key, level + 1);
                    }
                    self.out.push_str(" => ");
                    if let Ok(value) = pair.get::<Value>(1) {
                        self.value(&value, level + 1);
                    }
                }
                None => self.value(&entry, level + 1),
            }
        }
        self.out.push_str(" }");
    }
}

fn coerce(value: &Value<'_>) -> String {
    value
        .get::<Coerced<String>>()
        .map(|c| c.0)
        .unwrap_or_else(|_| format!("[{:?}]", value.type_of()))
}

/* ===================== Primitives ===================== */

fn push_quoted(out: &mut String, text: &str) {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    out.push(quote);
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// `Symbol(desc)`; symbols refuse implicit string coercion
fn symbol_text(value: &Value<'_>) -> String {
    value
        .ctx()
        .globals()
        .get::<_, Function>("String")
        .and_then(|string| string.call::<_, String>((value.clone(),)))
        .unwrap_or_else(|_| "Symbol()".to_string())
}

fn function_text(value: &Value<'_>) -> String {
    let name = value
        .as_object()
        .and_then(|f| f.get::<_, Option<String>>("name").ok().flatten())
        .filter(|n| !n.is_empty());

    let is_class = value.type_of() == Type::Constructor
        && coerce(value).trim_start().starts_with("class");

    match (is_class, name) {
        (true, Some(name)) => format!("[class {}]", name),
        (true, None) => "[class (anonymous)]".to_string(),
        (false, Some(name)) => format!("[Function: {}]", name),
        (false, None) => "[Function (anonymous)]".to_string(),
    }
}

/// `Name: message`, bracketed when nested inside a container
fn error_text(value: &Value<'_>, level: usize) -> String {
    let Some(error) = value.as_object() else {
        return coerce(value);
    };

    let name = error
        .get::<_, Option<String>>("name")
        .ok()
        .flatten()
        .unwrap_or_else(|| "Error".to_string());
    let message = error
        .get::<_, Option<Coerced<String>>>("message")
        .ok()
        .flatten()
        .map(|m| m.0)
        .unwrap_or_default();

    let text = if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    };

    if level == 0 {
        text
    } else {
        format!("[{}]", text)
    }
}

fn format_number(value: &Value<'_>, spec: char) -> String {
    let number = value
        .ctx()
        .globals()
        .get::<_, Function>("Number")
        .and_then(|number| number.call::<_, f64>((value.clone(),)))
        .unwrap_or(f64::NAN);

    if spec != 'i' {
        return Value::new_float(value.ctx().clone(), number)
            .get::<Coerced<String>>()
            .map(|c| c.0)
            .unwrap_or_else(|_| "NaN".to_string());
    }

    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        if number > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{}", number.trunc() as i64)
    }
}

fn format_json(value: &Value<'_>) -> String {
    match value.ctx().json_stringify(value.clone()) {
        Ok(Some(text)) => text.to_string().unwrap_or_default(),
        Ok(None) => "undefined".to_string(),
        Err(_) => "[Circular]".to_string(),
    }
}

/* ===================== Object Helpers ===================== */

fn push_key(out: &mut String, key: &str) {
    let mut chars = key.chars();
    let identifier = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');

    if identifier {
        out.push_str(key);
    } else {
        push_quoted(out, key);
    }
}

/// Name of the object's constructor; `None` for null-prototype objects
fn constructor_name(object: &Object<'_>) -> Option<String> {
    object.get_prototype()?;
    let name = object
        .get::<_, Option<Object>>("constructor")
        .ok()
        .flatten()
        .and_then(|ctor| ctor.get::<_, Option<String>>("name").ok().flatten())
        .unwrap_or_default();

    if name.is_empty() {
        Some("Object".to_string())
    } else {
        Some(name)
    }
}

fn date_text(object: &Object<'_>) -> String {
    object
        .get::<_, Function>("toISOString")
        .and_then(|f| f.call::<_, String>((This(object.clone()),)))
        .unwrap_or_else(|_| "Invalid Date".to_string())
}

fn byte_len(object: &Object<'_>) -> usize {
    object.get::<_, f64>("length").map(|n| n as usize).unwrap_or(0)
}

fn write_buffer(out: &mut String, object: &Object<'_>) {
    let len = byte_len(object);
    out.push_str("<Buffer");
    for i in 0..len.min(MAX_BUFFER_BYTES) {
        let byte = object.get::<_, u8>(i as u32).unwrap_or(0);
        out.push_str(&format!(" {:02x}", byte));
    }
    if len > MAX_BUFFER_BYTES {
        out.push_str(&format!(" ... {} more bytes", len - MAX_BUFFER_BYTES));
    }
    out.push('>');
}
