// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Endpoint tests for POST /predict
//!
//! Models are replaced by fixed fakes and both stores live in memory, so the
//! tests exercise form parsing, the eye gate, persistence and error mapping.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use anemia_eye_service::{
    prediction::Label,
    storage::{ImageStore, MemoryDocumentStore, StorageError},
};
use tower::util::ServiceExt; // for `oneshot`

use super::common::*;

fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
mod predict_endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_predict_returns_record() {
        let test = test_app(2, Label::Anemia, 0.9731);
        let image = png_bytes(64, 48);
        let body = multipart_body(&[
            Part::Text("user_id", "user-42"),
            Part::File("my_image", "eye.png", &image),
        ]);

        let response = test.app.clone().oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["id"], "user-42");
        assert_eq!(json["hasil"], "Terindikasi Anemia!");
        assert_eq!(json["akurasi"], "97.31%");
        assert!(json["deskripsi"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(json["gejala"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(json["timestamp"].as_str().is_some_and(|s| s.len() == 19));

        let advisory = &json["informasi_tambahan"];
        for key in [
            "tindakan_saran",
            "pencegahan",
            "risiko_komplikasi",
            "perawatan_medis",
            "gayahidup_sehat",
        ] {
            assert!(advisory[key].is_string(), "missing advisory key {}", key);
        }

        let image_url = json["image_url"].as_str().unwrap();
        assert!(image_url.starts_with(&format!("{}/predictions/", PUBLIC_BASE)));
        assert!(image_url.ends_with(".png"));

        assert_eq!(test.uploaded().await, 1);
        assert_eq!(test.documents.count("predictions").await, 1);
    }

    #[tokio::test]
    async fn test_uploaded_bytes_match_request() {
        let test = test_app(1, Label::Normal, 0.8);
        let image = png_bytes(20, 20);
        let body = multipart_body(&[
            Part::File("my_image", "eye.png", &image),
            Part::Text("user_id", "u1"),
        ]);

        let response = test.app.clone().oneshot(predict_request(body)).await.unwrap();
        let json = body_json(response).await;
        let url = json["image_url"].as_str().unwrap();
        let name = url.trim_start_matches(&format!("{}/", PUBLIC_BASE));

        let (stored, content_type) = test.uploaded_object(name).await;
        assert_eq!(stored, image);
        assert_eq!(content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_normal_label_uses_normal_texts() {
        let test = test_app(1, Label::Normal, 0.6);
        let image = png_bytes(16, 16);
        let body = multipart_body(&[
            Part::Text("user_id", "u1"),
            Part::File("my_image", "eye.png", &image),
        ]);

        let json = body_json(test.app.oneshot(predict_request(body)).await.unwrap()).await;
        let advisory = Label::Normal.advisory();
        assert_eq!(json["hasil"], "Normal");
        assert_eq!(json["akurasi"], "60.00%");
        assert_eq!(
            json["informasi_tambahan"]["pencegahan"],
            advisory.prevention.as_str()
        );
    }

    #[tokio::test]
    async fn test_missing_image_is_400() {
        let test = test_app(1, Label::Normal, 0.9);
        let body = multipart_body(&[Part::Text("user_id", "u1")]);

        let response = test.app.clone().oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Data tidak lengkap");
        assert_eq!(json["details"]["field"], "my_image");
        assert_eq!(test.uploaded().await, 0);
    }

    #[tokio::test]
    async fn test_missing_user_id_is_400() {
        let test = test_app(1, Label::Normal, 0.9);
        let image = png_bytes(16, 16);
        let body = multipart_body(&[Part::File("my_image", "eye.png", &image)]);

        let response = test.app.oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Data tidak lengkap");
    }

    #[tokio::test]
    async fn test_non_multipart_is_400() {
        let test = test_app(1, Label::Normal, 0.9);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"user_id":"u1"}"#))
            .unwrap();

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Data tidak lengkap");
    }

    #[tokio::test]
    async fn test_corrupt_image_is_400() {
        let test = test_app(1, Label::Normal, 0.9);
        let body = multipart_body(&[
            Part::Text("user_id", "u1"),
            Part::File("my_image", "eye.jpg", b"\xFF\xD8\xFF\xE0 truncated jpeg"),
        ]);

        let response = test.app.oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(
            json["error"],
            "Gambar tidak valid. Harap unggah gambar dengan jelas."
        );
        assert_eq!(json["error_type"], "invalid_image");
    }

    #[tokio::test]
    async fn test_no_eye_is_400_and_stores_nothing() {
        let test = test_app(0, Label::Anemia, 0.99);
        let image = png_bytes(32, 32);
        let body = multipart_body(&[
            Part::Text("user_id", "u1"),
            Part::File("my_image", "face.png", &image),
        ]);

        let response = test.app.clone().oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Gambar tidak valid. Harap unggah gambar dengan jelas."
        );
        assert_eq!(test.uploaded().await, 0);
        assert_eq!(test.documents.count("predictions").await, 0);
    }

    #[tokio::test]
    async fn test_upload_failure_is_500() {
        // A plain file where the upload directory should be makes the write fail
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("predictions"), b"blocker").unwrap();
        let images = ImageStore::local(dir.path(), "http://localhost:8080/static").unwrap();
        let documents = MemoryDocumentStore::new();
        let app = app_with_stores(1, Label::Normal, 0.9, images, documents.clone());

        let image = png_bytes(16, 16);
        let body = multipart_body(&[
            Part::Text("user_id", "u1"),
            Part::File("my_image", "eye.png", &image),
        ]);

        let response = app.oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error_type"], "internal_error");
        assert_eq!(documents.count("predictions").await, 0);
    }

    #[tokio::test]
    async fn test_record_write_failure_removes_upload() {
        let test = test_app(1, Label::Normal, 0.9);
        test.documents
            .inject_error(StorageError::ServerError("firestore down".into()))
            .await;
        let image = png_bytes(16, 16);
        let body = multipart_body(&[
            Part::Text("user_id", "u1"),
            Part::File("my_image", "eye.png", &image),
        ]);

        let response = test.app.clone().oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(test.uploaded().await, 0);
    }

    #[tokio::test]
    async fn test_health_reports_backends() {
        let test = test_app(1, Label::Normal, 0.9);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["version"]["features"].as_array().is_some_and(|f| !f.is_empty()));
        assert_eq!(json["storage"]["objects"], "memory");
        assert_eq!(json["storage"]["documents"], "memory");
        assert_eq!(json["models"].as_array().unwrap().len(), 2);
    }
}
