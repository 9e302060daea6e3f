// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试套件
    //!
    //! 模拟常见的攻击向量，验证工具包的防御能力：
    //! - 路径遍历（下载文件名、上传文件名）
    //! - 超大报文（请求头、请求体）
    //! - 响应头注入（CRLF）
    //! - 伪造的 Content-Length

    use std::io::Cursor;

    use webtoolkit::{ErrorKind, Exception, HttpRequestMethod, Request, Toolkit};

    async fn parse(raw: &[u8]) -> Result<Request, Exception> {
        Request::read_from(Cursor::new(raw.to_vec()), 0).await
    }

    fn multipart(file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"{}\"\r\n\r\n",
            file_name
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n--B--\r\n");
        body
    }

    /// ## 攻击向量：下载路径遍历
    #[tokio::test]
    async fn test_download_path_traversal() {
        let root = tempfile::tempdir().unwrap();
        let public = root.path().join("public");
        std::fs::create_dir(&public).unwrap();
        std::fs::write(root.path().join("secret.txt"), b"top secret").unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/download");
        let toolkit = Toolkit::default();

        for attack in ["../secret.txt", "sub/../../secret.txt", "/etc/passwd"] {
            let result = toolkit
                .download_static_file(&request, &public, attack, "x.txt")
                .await;
            match result {
                Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidPath, "attack {}", attack),
                Ok(_) => panic!("路径遍历攻击应该被阻止：{}", attack),
            }
        }
    }

    /// ## 攻击向量：上传文件名遍历
    /// 即使关闭重命名，文件也只会写在目标目录内。
    #[tokio::test]
    async fn test_upload_file_name_traversal() {
        let root = tempfile::tempdir().unwrap();
        let uploads = root.path().join("uploads");

        for attack in ["../escaped.txt", "..\\..\\escaped.txt", "/tmp/escaped.txt"] {
            let mut request = Request::new(HttpRequestMethod::Post, "/upload");
            request
                .set_content_type("multipart/form-data; boundary=B")
                .set_body(multipart(attack, b"payload"));

            let files = Toolkit::default()
                .upload_files(&mut request, &uploads, Some(false))
                .await
                .unwrap();

            assert_eq!(files[0].new_file_name(), "escaped.txt");
        }
        assert!(uploads.join("escaped.txt").is_file());
        assert!(!root.path().join("escaped.txt").exists());
    }

    /// ## 攻击向量：超大请求头
    #[tokio::test]
    async fn test_oversized_header() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Large: ".to_vec();
        raw.extend(std::iter::repeat(b'A').take(20 * 1024));
        raw.extend_from_slice(b"\r\n\r\n");

        let err = parse(&raw).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.status_code(), 400);
    }

    /// ## 攻击向量：伪造的 Content-Length
    /// 声明的长度比实际数据长时，JSON 解码只会看到截断的数据。
    #[tokio::test]
    async fn test_content_length_larger_than_body() {
        let raw = b"POST /notes HTTP/1.1\r\nContent-Length: 500\r\n\r\n{\"title\":\"x\"";
        let mut request = parse(raw).await.unwrap();

        let err = Toolkit::default()
            .read_json::<serde_json::Value>(&mut request)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::JsonTruncated);
    }

    /// ## 攻击向量：请求体超出 JSON 上限
    /// 读取在上限之后一个字节处停止，不会把整个请求体读入内存。
    #[tokio::test]
    async fn test_json_flood() {
        let mut toolkit = Toolkit::default();
        toolkit.config_mut().max_json_bytes = 1024;
        let flood = format!("[{}1]", "1,".repeat(100_000));
        let mut request = Request::new(HttpRequestMethod::Post, "/notes");
        request.set_body(flood);

        let err = toolkit
            .read_json::<Vec<u32>>(&mut request)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BodyTooLarge);
        assert_eq!(err.status_code(), 413);
    }

    /// ## 攻击向量：CRLF 注入
    /// 下载文件的显示名不能拆分出新的响应头。
    #[tokio::test]
    async fn test_crlf_injection_in_display_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.4").unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/download/report.pdf");

        let response = Toolkit::default()
            .download_static_file(
                &request,
                dir.path(),
                "report.pdf",
                "report.pdf\r\nSet-Cookie: session=stolen",
            )
            .await
            .unwrap();

        let raw = String::from_utf8_lossy(&response.as_bytes()).to_string();
        assert!(!raw.contains("\r\nSet-Cookie:"));
        assert_eq!(response.content_type(), Some("application/pdf"));
    }

    /// ## 协议健壮性：不支持的方法与版本
    #[tokio::test]
    async fn test_unsupported_method_and_version() {
        let err = parse(b"DELETE /x HTTP/1.1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, Exception::UnSupportedRequestMethod));

        let err = parse(b"GET /x HTTP/2\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, Exception::UnsupportedHttpVersion));
    }
}
