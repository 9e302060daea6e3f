// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 工具包演示服务器
//!
//! 基于 Tokio 运行时的多线程 HTTP 服务，用几条路由演示工具包的全部能力：
//! - `POST /upload`：保存表单中的所有文件
//! - `POST /upload/one`：只保存第一个文件
//! - `POST /notes`：严格解码 JSON 请求体，返回标题的 slug
//! - `GET|HEAD /download/<name>`：以附件形式下载静态目录中的文件
//!
//! 其余路径一律返回 404 的 JSON 错误信封。按 Ctrl-C 停机。

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    path::Path,
    sync::Arc,
    time::Instant,
};

use log::{debug, error, info, warn};
use serde_derive::{Deserialize, Serialize};
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    runtime::Builder,
};

use webtoolkit::{
    error_json, util, write_json, Config, Exception, Headers, HttpRequestMethod, JsonResponse,
    Request, Toolkit, UploadedFile,
};

/// `POST /notes` 的请求体
#[derive(Deserialize, Debug)]
struct Note {
    title: String,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Serialize, Debug)]
struct NoteCreated {
    slug: String,
    body_length: usize,
}

/// # 程序入口点
///
/// 初始化日志、加载配置，然后在自定义的多线程运行时上启动监听循环。
fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 环境配置加载：从 TOML 文件读取运行参数
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("上传目录：{}，静态目录：{}", config.upload_dir(), config.static_dir());

    // 3. 根据配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            return;
        }
    };
    runtime.block_on(serve(config));
}

async fn serve(config: Config) {
    let toolkit = Arc::new(Toolkit::new(config.toolkit().clone()));
    let config = Arc::new(config);

    // 支持全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, port);
    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("服务端在{}上监听Socket连接", socket);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut id: u128 = 0;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("接受连接失败：{}", e);
                        continue;
                    }
                };
                debug!("[ID{}]新的连接：{}", id, addr);
                let toolkit = Arc::clone(&toolkit);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_connection(stream, id, toolkit, config).await;
                });
                id += 1;
            }
            _ = &mut shutdown => {
                info!("收到停机信号，正在退出...");
                break;
            }
        }
    }
}

/// # 连接处理器
///
/// 读取并解析一个请求，交给路由处理；处理失败时以 JSON 错误信封应答。
async fn handle_connection(stream: TcpStream, id: u128, toolkit: Arc<Toolkit>, config: Arc<Config>) {
    let start_time = Instant::now();
    let (reader, mut writer) = stream.into_split();

    let mut request = match Request::read_from(reader, id).await {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败：{}", id, e);
            let _ = error_json(&mut writer, &e, Some(e.status_code())).await;
            return;
        }
    };
    debug!("[ID{}]成功解析HTTP请求", id);

    let status = match route(&mut request, &toolkit, &config, &mut writer).await {
        Ok(status) => status,
        Err(e) => {
            let status = e.status_code();
            warn!("[ID{}]请求处理失败（{}）：{}", id, e.kind(), e);
            if let Err(write_err) = error_json(&mut writer, &e, Some(status)).await {
                warn!("[ID{}]发送错误响应失败：{}", id, write_err);
            }
            status
        }
    };

    info!(
        "[ID{}]{} {} -> {}，耗时{}ms，UA：{}",
        id,
        request.method(),
        request.path(),
        status,
        start_time.elapsed().as_millis(),
        request.user_agent(),
    );
}

/// 按方法和路径分发请求，返回实际写出的状态码
async fn route(
    request: &mut Request,
    toolkit: &Toolkit,
    config: &Config,
    sink: &mut OwnedWriteHalf,
) -> Result<u16, Exception> {
    let path = request.path().split('?').next().unwrap_or("").to_string();
    match (request.method(), path.as_str()) {
        (HttpRequestMethod::Post, "/upload") => upload_many(request, toolkit, config, sink).await,
        (HttpRequestMethod::Post, "/upload/one") => upload_one(request, toolkit, config, sink).await,
        (HttpRequestMethod::Post, "/notes") => create_note(request, toolkit, sink).await,
        (HttpRequestMethod::Get | HttpRequestMethod::Head, p) if p.starts_with("/download/") => {
            let name = &p["/download/".len()..];
            let mut response = toolkit
                .download_static_file(request, Path::new(config.static_dir()), name, util::base_name(name))
                .await?;
            response.write_to(sink).await?;
            Ok(response.status_code())
        }
        _ => {
            error_json(sink, "the requested resource was not found", Some(404)).await?;
            Ok(404)
        }
    }
}

async fn upload_many(
    request: &mut Request,
    toolkit: &Toolkit,
    config: &Config,
    sink: &mut OwnedWriteHalf,
) -> Result<u16, Exception> {
    let id = request.id();
    match toolkit
        .upload_files(request, Path::new(config.upload_dir()), None)
        .await
    {
        Ok(files) => {
            let total: u64 = files.iter().map(|f| f.file_size()).sum();
            info!("[ID{}]保存了{}个文件，共{}", id, files.len(), util::format_file_size(total));
            let payload = JsonResponse {
                error: false,
                message: format!("uploaded {} file(s)", files.len()),
                data: Some(files),
            };
            write_json(sink, 200, &payload, None).await?;
            Ok(200)
        }
        Err(e) => {
            let (uploaded, cause) = e.into_parts();
            if uploaded.is_empty() {
                return Err(cause);
            }
            // 部分文件已经落盘，把它们和错误一起告诉客户端
            warn!("[ID{}]上传中止，已保存{}个文件：{}", id, uploaded.len(), cause);
            let status = cause.status_code();
            let payload: JsonResponse<Vec<UploadedFile>> = JsonResponse {
                error: true,
                message: cause.to_string(),
                data: Some(uploaded),
            };
            write_json(sink, status, &payload, None).await?;
            Ok(status)
        }
    }
}

async fn upload_one(
    request: &mut Request,
    toolkit: &Toolkit,
    config: &Config,
    sink: &mut OwnedWriteHalf,
) -> Result<u16, Exception> {
    let file = toolkit
        .upload_one_file(request, Path::new(config.upload_dir()), None)
        .await
        .map_err(|e| e.into_parts().1)?;
    let payload = JsonResponse {
        error: false,
        message: format!("uploaded {}", file.original_file_name()),
        data: Some(file),
    };
    write_json(sink, 200, &payload, None).await?;
    Ok(200)
}

async fn create_note(
    request: &mut Request,
    toolkit: &Toolkit,
    sink: &mut OwnedWriteHalf,
) -> Result<u16, Exception> {
    let note: Note = toolkit.read_json(request).await?;
    let slug = toolkit.slugify(&note.title)?;
    let mut headers = Headers::new();
    headers.set("Location", &format!("/notes/{}", slug));
    let payload = JsonResponse {
        error: false,
        message: "note created".to_string(),
        data: Some(NoteCreated {
            body_length: note.body.as_deref().map_or(0, str::len),
            slug,
        }),
    };
    write_json(sink, 201, &payload, Some(&headers)).await?;
    Ok(201)
}
