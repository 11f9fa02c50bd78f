//! Host-backed builtins: `process`, `os`, `path`, `fs`, `util`, `crypto`
//!
//! Each group is a plain object of native functions on the prelude's
//! `native` object. `prelude.js` turns them into the modules `require`
//! hands out, adding the JavaScript-only conveniences.

use crate::sandbox::{inspect, path, SandboxOptions};
use rand::{Rng, RngCore};
use ring::hmac;
use rquickjs::prelude::Rest;
use rquickjs::{Ctx, Exception, Function, Object, Value};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::io;
use std::path::{Path, PathBuf};

/* ===================== Platform Names ===================== */

/// `process.platform` / `os.platform()`
pub fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// `process.arch` / `os.arch()`
pub fn node_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        other => other,
    }
}

/// `os.type()`
pub fn os_type() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows_NT",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/* ===================== Install ===================== */

pub fn install<'js>(
    ctx: &Ctx<'js>,
    native: &Object<'js>,
    options: &SandboxOptions,
) -> rquickjs::Result<()> {
    native.set("process", process_object(ctx, options)?)?;
    native.set("os", os_object(ctx)?)?;
    native.set("path", path_object(ctx, options)?)?;
    native.set("fs", fs_object(ctx, options)?)?;
    native.set("util", util_object(ctx, options)?)?;
    native.set("crypto", crypto_object(ctx)?)?;
    Ok(())
}

fn process_object<'js>(ctx: &Ctx<'js>, options: &SandboxOptions) -> rquickjs::Result<Object<'js>> {
    let process = Object::new(ctx.clone())?;
    process.set("platform", node_platform())?;
    process.set("arch", node_arch())?;
    process.set("pid", std::process::id())?;
    process.set("version", concat!("v", env!("CARGO_PKG_VERSION")))?;
    process.set("title", "scratchpad")?;

    let versions = Object::new(ctx.clone())?;
    versions.set("scratchpad", env!("CARGO_PKG_VERSION"))?;
    versions.set("quickjs", "rquickjs")?;
    process.set("versions", versions)?;

    let mut argv = vec!["scratchpad".to_string(), options.filename.clone()];
    argv.extend(options.argv.iter().cloned());
    process.set("argv", argv)?;
    process.set("env", options.env.clone())?;

    let cwd = options.cwd.display().to_string();
    process.set(
        "cwd",
        Function::new(ctx.clone(), move || cwd.clone())?.with_name("cwd")?,
    )?;

    let started = options.started;
    process.set(
        "uptime",
        Function::new(ctx.clone(), move || started.elapsed().as_secs_f64())?
            .with_name("uptime")?,
    )?;
    process.set(
        "hrtime",
        Function::new(ctx.clone(), move || {
            let elapsed = started.elapsed();
            vec![elapsed.as_secs() as f64, elapsed.subsec_nanos() as f64]
        })?
        .with_name("hrtime")?,
    )?;

    Ok(process)
}

fn os_object<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let os = Object::new(ctx.clone())?;
    os.set("platform", node_platform())?;
    os.set("arch", node_arch())?;
    os.set("type", os_type())?;
    os.set(
        "homedir",
        dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "/".to_string()),
    )?;
    os.set("tmpdir", std::env::temp_dir().display().to_string())?;
    os.set("hostname", hostname())?;
    os.set("EOL", if cfg!(windows) { "\r\n" } else { "\n" })?;
    os.set(
        "cpuCount",
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as u32,
    )?;
    Ok(os)
}

/* ===================== path ===================== */

fn path_object<'js>(ctx: &Ctx<'js>, options: &SandboxOptions) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    let cwd = options.cwd.display().to_string();

    obj.set("sep", path::SEP)?;
    obj.set("delimiter", path::DELIMITER)?;
    obj.set(
        "join",
        Function::new(ctx.clone(), |parts: Rest<String>| path::join(&parts.0))?.with_name("join")?,
    )?;

    let resolve_cwd = cwd.clone();
    obj.set(
        "resolve",
        Function::new(ctx.clone(), move |parts: Rest<String>| {
            path::resolve(&resolve_cwd, &parts.0)
        })?
        .with_name("resolve")?,
    )?;
    obj.set(
        "relative",
        Function::new(ctx.clone(), move |from: String, to: String| {
            path::relative(&cwd, &from, &to)
        })?
        .with_name("relative")?,
    )?;
    obj.set(
        "normalize",
        Function::new(ctx.clone(), |p: String| path::normalize(&p))?.with_name("normalize")?,
    )?;
    obj.set(
        "dirname",
        Function::new(ctx.clone(), |p: String| path::dirname(&p))?.with_name("dirname")?,
    )?;
    obj.set(
        "basename",
        Function::new(ctx.clone(), |p: String, ext: Option<String>| {
            path::basename(&p, ext.as_deref())
        })?
        .with_name("basename")?,
    )?;
    obj.set(
        "extname",
        Function::new(ctx.clone(), |p: String| path::extname(&p))?.with_name("extname")?,
    )?;
    obj.set(
        "isAbsolute",
        Function::new(ctx.clone(), |p: String| path::is_absolute(&p))?.with_name("isAbsolute")?,
    )?;

    Ok(obj)
}

/* ===================== fs ===================== */

/// Node-style message: `ENOENT: no such file or directory, open 'x'`
fn fs_error(err: &io::Error, syscall: &str, path: &str) -> String {
    let (code, description) = match err.kind() {
        io::ErrorKind::NotFound => ("ENOENT", "no such file or directory".to_string()),
        io::ErrorKind::PermissionDenied => ("EACCES", "permission denied".to_string()),
        io::ErrorKind::AlreadyExists => ("EEXIST", "file already exists".to_string()),
        _ => ("EIO", err.to_string()),
    };
    format!("{}: {}, {} '{}'", code, description, syscall, path)
}

fn host_path(cwd: &Path, path: &str) -> PathBuf {
    cwd.join(path)
}

fn fs_object<'js>(ctx: &Ctx<'js>, options: &SandboxOptions) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;

    let cwd = options.cwd.clone();
    obj.set(
        "readText",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, p: String| {
            std::fs::read_to_string(host_path(&cwd, &p))
                .map_err(|e| Exception::throw_message(&ctx, &fs_error(&e, "open", &p)))
        })?
        .with_name("readText")?,
    )?;

    let cwd = options.cwd.clone();
    obj.set(
        "readBytes",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, p: String| {
            std::fs::read(host_path(&cwd, &p))
                .map_err(|e| Exception::throw_message(&ctx, &fs_error(&e, "open", &p)))
        })?
        .with_name("readBytes")?,
    )?;

    let cwd = options.cwd.clone();
    obj.set(
        "writeText",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, p: String, text: String| {
            std::fs::write(host_path(&cwd, &p), text)
                .map_err(|e| Exception::throw_message(&ctx, &fs_error(&e, "open", &p)))
        })?
        .with_name("writeText")?,
    )?;

    let cwd = options.cwd.clone();
    obj.set(
        "writeBytes",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, p: String, bytes: Vec<u8>| {
            std::fs::write(host_path(&cwd, &p), bytes)
                .map_err(|e| Exception::throw_message(&ctx, &fs_error(&e, "open", &p)))
        })?
        .with_name("writeBytes")?,
    )?;

    let cwd = options.cwd.clone();
    obj.set(
        "exists",
        Function::new(ctx.clone(), move |p: String| host_path(&cwd, &p).exists())?
            .with_name("exists")?,
    )?;

    let cwd = options.cwd.clone();
    obj.set(
        "readdir",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, p: String| {
            let entries = std::fs::read_dir(host_path(&cwd, &p))
                .map_err(|e| Exception::throw_message(&ctx, &fs_error(&e, "scandir", &p)))?;

            let mut names = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            names.sort();
            Ok::<_, rquickjs::Error>(names)
        })?
        .with_name("readdir")?,
    )?;

    Ok(obj)
}

/* ===================== util ===================== */

fn util_object<'js>(ctx: &Ctx<'js>, options: &SandboxOptions) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    let default_depth = options.inspect_depth;

    obj.set(
        "inspect",
        Function::new(ctx.clone(), move |value: Value<'js>, depth: Option<f64>| {
            let depth = match depth {
                Some(d) if d.is_infinite() && d > 0.0 => inspect::MAX_DEPTH,
                Some(d) if d.is_finite() && d >= 0.0 => (d as usize).min(inspect::MAX_DEPTH),
                _ => default_depth,
            };
            inspect::inspect(&value, depth)
        })?
        .with_name("inspect")?,
    )?;
    obj.set(
        "format",
        Function::new(ctx.clone(), move |args: Rest<Value<'js>>| {
            inspect::format(&args.0, default_depth)
        })?
        .with_name("format")?,
    )?;

    Ok(obj)
}

/* ===================== crypto ===================== */

/// Digest of `data` with a SHA-2 family algorithm
pub fn digest(algorithm: &str, data: &[u8]) -> Option<Vec<u8>> {
    let bytes = match algorithm.to_ascii_lowercase().as_str() {
        "sha224" => Sha224::digest(data).to_vec(),
        "sha256" => Sha256::digest(data).to_vec(),
        "sha384" => Sha384::digest(data).to_vec(),
        "sha512" => Sha512::digest(data).to_vec(),
        _ => return None,
    };
    Some(bytes)
}

/// HMAC of `data` under `key`
pub fn hmac_sign(algorithm: &str, key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let algorithm = match algorithm.to_ascii_lowercase().as_str() {
        "sha256" => hmac::HMAC_SHA256,
        "sha384" => hmac::HMAC_SHA384,
        "sha512" => hmac::HMAC_SHA512,
        _ => return None,
    };
    let key = hmac::Key::new(algorithm, key);
    Some(hmac::sign(&key, data).as_ref().to_vec())
}

fn crypto_object<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;

    obj.set(
        "randomBytes",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, size: f64| {
            if !(0.0..=65536.0).contains(&size) {
                return Err(Exception::throw_range(
                    &ctx,
                    "The value of \"size\" is out of range. It must be >= 0 && <= 65536.",
                ));
            }
            let mut bytes = vec![0u8; size as usize];
            rand::thread_rng().fill_bytes(&mut bytes);
            Ok(bytes)
        })?
        .with_name("randomBytes")?,
    )?;
    obj.set(
        "randomUUID",
        Function::new(ctx.clone(), || uuid::Uuid::new_v4().to_string())?.with_name("randomUUID")?,
    )?;
    obj.set(
        "randomInt",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, min: f64, max: f64| {
            let (min, max) = (min.floor() as i64, max.floor() as i64);
            if min >= max {
                return Err(Exception::throw_range(
                    &ctx,
                    "The value of \"max\" is out of range. It must be greater than the value of \"min\".",
                ));
            }
            Ok(rand::thread_rng().gen_range(min..max) as f64)
        })?
        .with_name("randomInt")?,
    )?;
    obj.set(
        "digest",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, algorithm: String, data: Vec<u8>| {
            digest(&algorithm, &data).ok_or_else(|| {
                Exception::throw_message(&ctx, &format!("Digest method not supported: {}", algorithm))
            })
        })?
        .with_name("digest")?,
    )?;
    obj.set(
        "hmac",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, algorithm: String, key: Vec<u8>, data: Vec<u8>| {
                hmac_sign(&algorithm, &key, &data).ok_or_else(|| {
                    Exception::throw_message(
                        &ctx,
                        &format!("Invalid digest: {}", algorithm),
                    )
                })
            },
        )?
        .with_name("hmac")?,
    )?;

    Ok(obj)
}
