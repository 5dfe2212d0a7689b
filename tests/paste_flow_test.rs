// 端到端编排测试：用可编程的事件 / 平台 / 抓取 / 能力桩替代真实宿主，
// 覆盖 perform_paste 的分支路径与合成尺寸计算。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use paste_compose::capability::{CapabilityAdapter, ImageCapability};
use paste_compose::error::PasteError;
use paste_compose::paste::{PasteEngine, PasteOptions, PasteOutcome, TextFormat, VECTOR_MEDIA_TYPE};
use paste_compose::platform::{
    ClipboardPlatform, EventFileEntry, FetchedResource, PasteEvent, PlatformItem,
    PlatformRepresentation, ResourceFetcher,
};

// ============================================================================
// 测试桩
// ============================================================================

#[derive(Default)]
struct MockEvent {
    entries: Vec<EventFileEntry>,
    strings: HashMap<String, String>,
}

impl MockEvent {
    fn with_html(mut self, html: &str) -> Self {
        self.strings.insert("text/html".to_string(), html.to_string());
        self
    }

    fn with_entry(mut self, media_type: &str, bytes: Vec<u8>, modified_at: Option<u64>) -> Self {
        self.entries.push(EventFileEntry {
            media_type: media_type.to_string(),
            bytes: Bytes::from(bytes),
            modified_at,
        });
        self
    }
}

impl PasteEvent for MockEvent {
    fn file_entries(&self) -> Vec<EventFileEntry> {
        self.entries.clone()
    }

    fn string_data(&self, media_type: &str) -> Option<String> {
        self.strings.get(media_type).cloned()
    }
}

#[derive(Default)]
struct MockPlatform {
    items: Vec<PlatformItem>,
    text: Option<String>,
    fail_read: bool,
}

impl ClipboardPlatform for MockPlatform {
    async fn read_items(&self) -> Result<Vec<PlatformItem>, PasteError> {
        if self.fail_read {
            return Err(PasteError::Platform("读取被权限策略拒绝".to_string()));
        }
        Ok(self.items.clone())
    }

    async fn read_text(&self) -> Result<Option<String>, PasteError> {
        if self.fail_read {
            return Err(PasteError::Platform("读取被权限策略拒绝".to_string()));
        }
        Ok(self.text.clone())
    }
}

#[derive(Default)]
struct MockFetcher {
    responses: HashMap<String, FetchedResource>,
}

impl MockFetcher {
    fn with_response(mut self, url: &str, media_type: Option<&str>, bytes: Vec<u8>) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchedResource {
                media_type: media_type.map(str::to_string),
                bytes: Bytes::from(bytes),
            },
        );
        self
    }
}

impl ResourceFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, PasteError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| PasteError::Network(format!("无桩响应：{}", url)))
    }
}

/// 具备矢量解码与标记测量能力的宿主桩（其余委托默认适配器）。
struct RasterHost {
    measured: Option<(u32, u32)>,
}

impl CapabilityAdapter for RasterHost {
    type Bitmap = RgbaImage;
    type Surface = RgbaImage;

    fn decode_bitmap(&self, bytes: &[u8], media_type: &str) -> Result<RgbaImage, PasteError> {
        if media_type.eq_ignore_ascii_case(VECTOR_MEDIA_TYPE) {
            return Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        }
        ImageCapability.decode_bitmap(bytes, media_type)
    }

    fn bitmap_dimensions(&self, bitmap: &RgbaImage) -> (u32, u32) {
        ImageCapability.bitmap_dimensions(bitmap)
    }

    fn create_surface(&self, width: u32, height: u32) -> Result<RgbaImage, PasteError> {
        ImageCapability.create_surface(width, height)
    }

    fn fill_surface(&self, surface: &mut RgbaImage, rgba: [u8; 4]) {
        ImageCapability.fill_surface(surface, rgba);
    }

    fn draw_bitmap(&self, surface: &mut RgbaImage, bitmap: &RgbaImage, x: u32, y: u32) {
        ImageCapability.draw_bitmap(surface, bitmap, x, y);
    }

    fn export_surface(&self, surface: RgbaImage, media_type: &str) -> Result<Vec<u8>, PasteError> {
        ImageCapability.export_surface(surface, media_type)
    }

    fn release_bitmap(&self, bitmap: RgbaImage) {
        ImageCapability.release_bitmap(bitmap);
    }

    fn measure_markup(&self, _markup: &str) -> Option<(u32, u32)> {
        self.measured
    }
}

// ============================================================================
// 辅助
// ============================================================================

fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("failed to encode test image");
    cursor.into_inner()
}

fn default_engine(
    platform: MockPlatform,
    fetcher: MockFetcher,
) -> PasteEngine<ImageCapability, MockPlatform, MockFetcher> {
    let _ = env_logger::builder().is_test(true).try_init();
    PasteEngine::new(ImageCapability, platform, fetcher)
}

fn expect_image(outcome: PasteOutcome) -> paste_compose::paste::EncodedImage {
    match outcome {
        PasteOutcome::Image(image) => image,
        PasteOutcome::Text(_) => panic!("expected image outcome, got text"),
    }
}

fn expect_text(outcome: PasteOutcome) -> paste_compose::paste::MergedTextPayload {
    match outcome {
        PasteOutcome::Text(text) => text,
        PasteOutcome::Image(_) => panic!("expected text outcome, got image"),
    }
}

// ============================================================================
// 文本路径
// ============================================================================

#[tokio::test]
async fn text_single_fragment_is_returned_verbatim() {
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());
    let event = MockEvent::default().with_html("<p>hello</p>");

    let outcome = engine
        .perform_paste(false, Some(&event), &PasteOptions::default())
        .await
        .expect("paste should succeed");

    let merged = expect_text(outcome);
    assert_eq!(merged.html.as_deref(), Some("<p>hello</p>"));
    assert_eq!(merged.preferred(), Some((TextFormat::Html, "<p>hello</p>")));
}

#[tokio::test]
async fn text_falls_back_to_platform_items_when_event_is_empty() {
    let platform = MockPlatform {
        items: vec![
            PlatformItem {
                representations: vec![PlatformRepresentation {
                    media_type: "text/plain".to_string(),
                    bytes: Bytes::from_static(b"cell-a"),
                }],
            },
            PlatformItem {
                representations: vec![PlatformRepresentation {
                    media_type: "text/plain".to_string(),
                    bytes: Bytes::from_static(b"cell-b"),
                }],
            },
        ],
        ..MockPlatform::default()
    };
    let engine = default_engine(platform, MockFetcher::default());

    let outcome = engine
        .perform_paste(false, None, &PasteOptions::default())
        .await
        .expect("paste should succeed");

    // 两个单行片段按制表符连接。
    assert_eq!(expect_text(outcome).plain.as_deref(), Some("cell-a\tcell-b"));
}

#[tokio::test]
async fn text_request_without_any_source_fails_with_no_text_data() {
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let result = engine.perform_paste(false, None, &PasteOptions::default()).await;

    assert!(matches!(result, Err(PasteError::NoTextData)));
}

#[tokio::test]
async fn text_read_text_is_used_as_last_resort() {
    let platform = MockPlatform {
        text: Some("fallback text".to_string()),
        ..MockPlatform::default()
    };
    let engine = default_engine(platform, MockFetcher::default());

    let outcome = engine
        .perform_paste(false, None, &PasteOptions::default())
        .await
        .expect("paste should succeed");

    assert_eq!(expect_text(outcome).plain.as_deref(), Some("fallback text"));
}

// ============================================================================
// 图片路径
// ============================================================================

#[tokio::test]
async fn single_event_image_without_hint_passes_bytes_through_unchanged() {
    let payload = png_bytes(13, 7, [200, 0, 0, 255]);
    let event = MockEvent::default().with_entry("image/png", payload.clone(), Some(42));
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    assert_eq!(image.media_type, "image/png");
    assert_eq!(image.bytes, payload);
}

#[tokio::test]
async fn duplicate_event_entries_are_deduplicated_by_identity_triple() {
    let payload = png_bytes(5, 5, [0, 200, 0, 255]);
    let event = MockEvent::default()
        .with_entry("image/png", payload.clone(), Some(7))
        .with_entry("image/png", payload.clone(), Some(7));
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    // 去重到单张后走无提示透传，字节应原样保留。
    assert_eq!(image.bytes, payload);
}

#[tokio::test]
async fn table_hint_composites_rows_with_expected_dimensions() {
    let hint = "<table>\
        <tr><td><img></td><td><img></td></tr>\
        <tr><td><img></td></tr>\
        </table>";
    let event = MockEvent::default()
        .with_html(hint)
        .with_entry("image/png", png_bytes(30, 20, [255, 0, 0, 255]), Some(1))
        .with_entry("image/png", png_bytes(40, 10, [0, 255, 0, 255]), Some(2))
        .with_entry("image/png", png_bytes(25, 35, [0, 0, 255, 255]), Some(3));
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    assert_eq!(image.media_type, "image/png");

    let composed = image::load_from_memory(&image.bytes)
        .expect("composite should decode")
        .to_rgba8();

    // 行 1：30x20 + 40x10；行 2：25x35 → 画布 70x55。
    assert_eq!(composed.dimensions(), (70, 55));
    assert_eq!(composed.get_pixel(0, 0).0, [255, 0, 0, 255]);
    assert_eq!(composed.get_pixel(30, 0).0, [0, 255, 0, 255]);
    assert_eq!(composed.get_pixel(0, 20).0, [0, 0, 255, 255]);
    // 行 2 右侧留白为不透明白色背景。
    assert_eq!(composed.get_pixel(60, 40).0, [255, 255, 255, 255]);
}

#[tokio::test]
async fn platform_items_supply_images_and_layout_hint() {
    let platform = MockPlatform {
        items: vec![
            PlatformItem {
                representations: vec![
                    PlatformRepresentation {
                        media_type: "text/html".to_string(),
                        bytes: Bytes::from_static(b"<p><img></p><p><img></p>"),
                    },
                    PlatformRepresentation {
                        media_type: "image/png".to_string(),
                        bytes: Bytes::from(png_bytes(10, 10, [255, 0, 0, 255])),
                    },
                ],
            },
            PlatformItem {
                representations: vec![PlatformRepresentation {
                    media_type: "image/png".to_string(),
                    bytes: Bytes::from(png_bytes(10, 10, [0, 0, 255, 255])),
                }],
            },
        ],
        ..MockPlatform::default()
    };
    let engine = default_engine(platform, MockFetcher::default());

    let image = expect_image(
        engine
            .perform_paste(true, None, &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    let composed = image::load_from_memory(&image.bytes)
        .expect("composite should decode")
        .to_rgba8();

    // 提示给出两行，每行一张 → 10x20 垂直堆叠。
    assert_eq!(composed.dimensions(), (10, 20));
    assert_eq!(composed.get_pixel(0, 0).0, [255, 0, 0, 255]);
    assert_eq!(composed.get_pixel(0, 10).0, [0, 0, 255, 255]);
}

#[tokio::test]
async fn inline_images_are_fetched_when_no_binary_sources_exist() {
    let hint = r#"<p><img src="https://test.example/a.png"></p><p><img src="https://test.example/b.png"></p>"#;
    let event = MockEvent::default().with_html(hint);
    let fetcher = MockFetcher::default()
        .with_response(
            "https://test.example/a.png",
            Some("image/png"),
            png_bytes(10, 10, [255, 0, 0, 255]),
        )
        .with_response(
            "https://test.example/b.png",
            Some("image/png"),
            png_bytes(20, 5, [0, 0, 255, 255]),
        );
    let engine = default_engine(MockPlatform::default(), fetcher);

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    let composed = image::load_from_memory(&image.bytes)
        .expect("composite should decode")
        .to_rgba8();

    assert_eq!(composed.dimensions(), (20, 15));
}

#[tokio::test]
async fn inline_fetch_failure_skips_candidate_but_keeps_collection_alive() {
    let hint = r#"<p><img src="https://test.example/ok.png"></p><p><img src="https://test.example/missing.png"></p>"#;
    let event = MockEvent::default().with_html(hint);
    let fetcher = MockFetcher::default().with_response(
        "https://test.example/ok.png",
        Some("image/png"),
        png_bytes(12, 6, [1, 2, 3, 255]),
    );

    let warnings: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let mut options = PasteOptions::default();
    options.rasterization.on_warning = Some(Arc::new(move |message, _cause| {
        sink.lock().expect("warning sink poisoned").push(message.to_string());
    }));

    let engine = default_engine(MockPlatform::default(), fetcher);
    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &options)
            .await
            .expect("paste should succeed"),
    );

    // 仅剩一张候选；提示引用 2 张与候选数不符 → 单行回退重编码。
    let composed = image::load_from_memory(&image.bytes)
        .expect("composite should decode")
        .to_rgba8();
    assert_eq!(composed.dimensions(), (12, 6));

    let logged = warnings.lock().expect("warning sink poisoned");
    assert!(logged.iter().any(|message| message.contains("跳过该候选")));
}

#[tokio::test]
async fn inline_data_uri_resolves_without_network() {
    use base64::{Engine as _, engine::general_purpose};

    let encoded = general_purpose::STANDARD.encode(png_bytes(9, 4, [7, 7, 7, 255]));
    let hint = format!(r#"<p><img src="data:image/png;base64,{}"></p>"#, encoded);
    let event = MockEvent::default().with_html(&hint);
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    let composed = image::load_from_memory(&image.bytes)
        .expect("composite should decode")
        .to_rgba8();
    assert_eq!(composed.dimensions(), (9, 4));
}

// ============================================================================
// 栅格化回退路径
// ============================================================================

#[tokio::test]
async fn zero_images_with_hint_rasterize_to_measured_box() {
    let event = MockEvent::default().with_html("<p>only markup</p>");
    let engine = PasteEngine::new(
        RasterHost {
            measured: Some((300, 200)),
        },
        MockPlatform::default(),
        MockFetcher::default(),
    );

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    assert_eq!(image.media_type, "image/png");
    let raster = image::load_from_memory(&image.bytes).expect("raster should decode");
    assert_eq!((raster.width(), raster.height()), (300, 200));
}

#[tokio::test]
async fn rasterization_measurement_is_clamped_per_axis() {
    let event = MockEvent::default().with_html("<p>wide</p>");
    let engine = PasteEngine::new(
        RasterHost {
            measured: Some((5000, 0)),
        },
        MockPlatform::default(),
        MockFetcher::default(),
    );

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    let raster = image::load_from_memory(&image.bytes).expect("raster should decode");
    assert_eq!((raster.width(), raster.height()), (4096, 1));
}

#[tokio::test]
async fn rasterization_degrades_to_vector_passthrough_without_vector_decode() {
    let event = MockEvent::default().with_html("<p>fallback</p>");
    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &PasteOptions::default())
            .await
            .expect("paste should succeed"),
    );

    assert_eq!(image.media_type, VECTOR_MEDIA_TYPE);
    let document = String::from_utf8(image.bytes).expect("vector document should be utf-8");
    assert!(document.contains("<p>fallback</p>"));
    assert!(document.contains("http://www.w3.org/2000/svg"));
}

#[tokio::test]
async fn vector_output_type_returns_serialized_document_directly() {
    let event = MockEvent::default().with_html("<p>svg out</p>");
    let mut options = PasteOptions::default();
    options.rasterization.output_media_type = VECTOR_MEDIA_TYPE.to_string();

    let engine = PasteEngine::new(
        RasterHost {
            measured: Some((64, 64)),
        },
        MockPlatform::default(),
        MockFetcher::default(),
    );

    let image = expect_image(
        engine
            .perform_paste(true, Some(&event), &options)
            .await
            .expect("paste should succeed"),
    );

    assert_eq!(image.media_type, VECTOR_MEDIA_TYPE);
    assert!(String::from_utf8(image.bytes)
        .expect("vector document should be utf-8")
        .contains(r#"width="64""#));
}

#[tokio::test]
async fn rasterization_disabled_falls_back_to_text_payload() {
    let event = MockEvent::default().with_html("<p>text instead</p>");
    let mut options = PasteOptions::default();
    options.enable_markup_rasterization = false;

    let engine = default_engine(MockPlatform::default(), MockFetcher::default());

    let outcome = engine
        .perform_paste(true, Some(&event), &options)
        .await
        .expect("paste should succeed");

    assert_eq!(
        expect_text(outcome).html.as_deref(),
        Some("<p>text instead</p>")
    );
}

// ============================================================================
// 失败恢复路径
// ============================================================================

#[tokio::test]
async fn platform_read_error_is_logged_and_treated_as_empty_source() {
    let warnings: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let mut options = PasteOptions::default();
    options.rasterization.on_warning = Some(Arc::new(move |message, _cause| {
        sink.lock().expect("warning sink poisoned").push(message.to_string());
    }));

    let platform = MockPlatform {
        fail_read: true,
        ..MockPlatform::default()
    };
    let engine = default_engine(platform, MockFetcher::default());

    let result = engine.perform_paste(true, None, &options).await;

    assert!(matches!(result, Err(PasteError::NoImageData)));
    let logged = warnings.lock().expect("warning sink poisoned");
    assert!(logged.iter().any(|message| message.contains("平台剪贴板读取失败")));
}

#[tokio::test]
async fn image_request_with_only_text_sources_returns_text_fallback() {
    let platform = MockPlatform {
        items: vec![PlatformItem {
            representations: vec![PlatformRepresentation {
                media_type: "text/plain".to_string(),
                bytes: Bytes::from_static(b"plain only"),
            }],
        }],
        ..MockPlatform::default()
    };
    let engine = default_engine(platform, MockFetcher::default());

    let outcome = engine
        .perform_paste(true, None, &PasteOptions::default())
        .await
        .expect("paste should succeed");

    assert_eq!(expect_text(outcome).plain.as_deref(), Some("plain only"));
}
