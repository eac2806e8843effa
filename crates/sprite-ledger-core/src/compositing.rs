use image::{Rgba, RgbaImage};

/// Composite `src` over `canvas` with its top-left corner at (dx, dy) using
/// straight-alpha source-over blending. Pixels falling outside the canvas are
/// clipped; over a fully transparent canvas the source is copied unchanged.
pub fn blit_over(src: &RgbaImage, canvas: &mut RgbaImage, dx: u32, dy: u32) {
    let (cw, ch) = canvas.dimensions();
    let (sw, sh) = src.dimensions();

    for yy in 0..sh {
        if dy + yy >= ch {
            break;
        }
        for xx in 0..sw {
            if dx + xx >= cw {
                break;
            }
            let s = *src.get_pixel(xx, yy);
            let d = *canvas.get_pixel(dx + xx, dy + yy);
            canvas.put_pixel(dx + xx, dy + yy, source_over(s, d));
        }
    }
}

fn source_over(s: Rgba<u8>, d: Rgba<u8>) -> Rgba<u8> {
    match (s[3], d[3]) {
        (255, _) | (_, 0) => s,
        (0, _) => d,
        (sa, da) => {
            let sa = sa as f32 / 255.0;
            let da = da as f32 / 255.0;
            let out_a = sa + da * (1.0 - sa);
            let mut px = [0u8; 4];
            for c in 0..3 {
                let v = (s[c] as f32 * sa + d[c] as f32 * da * (1.0 - sa)) / out_a;
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
            Rgba(px)
        }
    }
}
