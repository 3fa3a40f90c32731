use super::*;

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> SourceImage {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    SourceImage::new(image::DynamicImage::ImageRgba8(img))
}

#[test]
fn argb_output_is_alpha_first_and_opaque() {
    let buf = rasterize(&solid(2, 2, [10, 20, 30, 255]), 2, 2).unwrap();
    assert_eq!(buf.format(), PixelFormat::ARGB32);
    assert_eq!(buf.stride(), 8);
    assert_eq!(buf.data().len(), 16);
    for px in buf.data().chunks_exact(4) {
        assert_eq!(px, &[255, 10, 20, 30]);
    }
}

#[test]
fn transparent_pixels_flatten_over_background() {
    let r = Rasterizer::new(PixelFormat::RGBA32)
        .unwrap()
        .with_background([10, 20, 30]);
    let buf = r.rasterize(&solid(1, 1, [255, 0, 0, 0]), 1, 1).unwrap();
    assert_eq!(buf.data(), &[10, 20, 30, 255]);

    let half = r.rasterize(&solid(1, 1, [255, 0, 0, 128]), 1, 1).unwrap();
    assert_eq!(half.data()[3], 255);
    assert_eq!(half.data()[0], 128 + ((10u16 * 127 + 127) / 255) as u8);
}

#[test]
fn bgra_swaps_channels() {
    let r = Rasterizer::new(PixelFormat::BGRA32).unwrap();
    let buf = r.rasterize(&solid(1, 1, [1, 2, 3, 255]), 1, 1).unwrap();
    assert_eq!(buf.data(), &[3, 2, 1, 255]);
}

#[test]
fn stretches_to_target_size() {
    let buf = rasterize(&solid(640, 480, [0, 0, 0, 255]), 100, 50).unwrap();
    assert_eq!((buf.width(), buf.height()), (100, 50));
    assert_eq!(buf.data().len(), 100 * 50 * 4);
}

#[test]
fn repeated_rasterization_matches_layout() {
    let src = solid(7, 5, [9, 8, 7, 200]);
    let a = rasterize(&src, 16, 9).unwrap();
    let b = rasterize(&src, 16, 9).unwrap();
    assert_eq!(a.canvas(), b.canvas());
    assert_eq!(a.stride(), b.stride());
    assert_eq!(a.data().len(), b.data().len());
}

#[test]
fn grayscale_sources_normalise_to_rgb() {
    let img = image::GrayImage::from_pixel(1, 1, image::Luma([77]));
    let src = SourceImage::new(image::DynamicImage::ImageLuma8(img));
    let buf = rasterize(&src, 1, 1).unwrap();
    assert_eq!(buf.data(), &[255, 77, 77, 77]);
}

#[test]
fn row_alignment_pads_stride() {
    let r = Rasterizer::default().with_row_alignment(16).unwrap();
    let buf = r.rasterize(&solid(3, 2, [1, 2, 3, 255]), 3, 2).unwrap();
    assert_eq!(buf.stride(), 16);
    assert_eq!(buf.row_bytes(), 12);
    assert_eq!(buf.data().len(), 32);
    let packed = buf.packed();
    assert_eq!(packed.len(), 24);
    assert!(packed.chunks_exact(4).all(|px| px == [255, 1, 2, 3]));
    assert!(Rasterizer::default().with_row_alignment(0).is_err());
}

#[test]
fn empty_target_is_allocation_failure() {
    let err = rasterize(&solid(1, 1, [0, 0, 0, 255]), 0, 10).unwrap_err();
    assert!(matches!(err, RasterizeError::BufferAllocationFailed(_)));
}

#[test]
fn empty_source_is_decode_failure() {
    let src = SourceImage::new(image::DynamicImage::new_rgba8(0, 0));
    let err = rasterize(&src, 4, 4).unwrap_err();
    assert!(matches!(err, RasterizeError::DecodeFailed(_)));
}

#[test]
fn from_raw_validates_layout() {
    assert!(PixelBuffer::from_raw(2, 1, 8, PixelFormat::ARGB32, vec![0; 8]).is_ok());
    assert!(PixelBuffer::from_raw(2, 1, 4, PixelFormat::ARGB32, vec![0; 4]).is_err());
    assert!(PixelBuffer::from_raw(2, 1, 8, PixelFormat::ARGB32, vec![0; 7]).is_err());
    assert!(PixelBuffer::from_raw(0, 1, 8, PixelFormat::ARGB32, vec![]).is_err());
}
