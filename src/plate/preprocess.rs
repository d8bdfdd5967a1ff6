use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

/// CLAHE 对比度限制
const CLAHE_CLIP_LIMIT: f32 = 2.0;
/// CLAHE 网格（8x8 块）
const CLAHE_TILES: u32 = 8;
/// 去噪强度
const DENOISE_H: f32 = 10.0;
/// 去噪模板半径（3x3）
const TEMPLATE_RADIUS: i64 = 1;
/// 去噪搜索半径（7x7）
const SEARCH_RADIUS: i64 = 3;

/// OCR 前的车牌图像预处理
///
/// 1. 灰度化
/// 2. 2 倍三次插值放大
/// 3. CLAHE 局部对比度增强
/// 4. 非局部均值去噪
pub fn preprocess_plate(crop: &RgbImage) -> GrayImage {
    let gray = imageops::grayscale(crop);
    let upscaled = imageops::resize(
        &gray,
        gray.width() * 2,
        gray.height() * 2,
        FilterType::CatmullRom,
    );
    let enhanced = clahe(&upscaled, CLAHE_CLIP_LIMIT, CLAHE_TILES);
    denoise(&enhanced, DENOISE_H)
}

/// 限制对比度的自适应直方图均衡化
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || tiles == 0 {
        return gray.clone();
    }

    let tiles_x = tiles.min(width);
    let tiles_y = tiles.min(height);
    let tile_w = (width + tiles_x - 1) / tiles_x;
    let tile_h = (height + tiles_y - 1) / tiles_y;

    // 每块一张查找表
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
            clip_histogram(&mut hist, limit);

            let scale = 255.0 / area as f32;
            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut sum = 0u32;
            for (value, count) in hist.iter().enumerate() {
                sum += count;
                lut[value] = (sum as f32 * scale).round().min(255.0) as u8;
            }
        }
    }

    // 相邻四块查找表之间双线性插值
    let lut_at = |tx: u32, ty: u32, value: u8| luts[(ty * tiles_x + tx) as usize][value as usize] as f32;
    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0];

        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx1 = fx.floor();
        let ty1 = fy.floor();
        let wx = fx - tx1;
        let wy = fy - ty1;

        let clamp_x = |t: f32| t.clamp(0.0, (tiles_x - 1) as f32) as u32;
        let clamp_y = |t: f32| t.clamp(0.0, (tiles_y - 1) as f32) as u32;
        let (ax, bx) = (clamp_x(tx1), clamp_x(tx1 + 1.0));
        let (ay, by) = (clamp_y(ty1), clamp_y(ty1 + 1.0));

        let top = lut_at(ax, ay, value) * (1.0 - wx) + lut_at(bx, ay, value) * wx;
        let bottom = lut_at(ax, by, value) * (1.0 - wx) + lut_at(bx, by, value) * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    })
}

/// 截断直方图并把超出部分平均分回各个灰度级
fn clip_histogram(hist: &mut [u32; 256], limit: u32) {
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let batch = excess / 256;
    let residual = (excess % 256) as usize;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for i in (0..256).step_by(step).take(residual) {
            hist[i] += 1;
        }
    }
}

/// 非局部均值去噪
///
/// 3x3 模板在 7x7 邻域内比较，权重 exp(-d²/h²)，d² 为模板内平均平方差。
pub fn denoise(gray: &GrayImage, h: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let (w, hgt) = (width as i64, height as i64);
    let px = |x: i64, y: i64| gray.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, hgt - 1) as u32)[0] as f32;
    let template_size = ((2 * TEMPLATE_RADIUS + 1) * (2 * TEMPLATE_RADIUS + 1)) as f32;
    let h2 = h * h;

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;

        for sy in -SEARCH_RADIUS..=SEARCH_RADIUS {
            for sx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                let (qx, qy) = (x + sx, y + sy);
                let mut distance = 0.0f32;
                for ty in -TEMPLATE_RADIUS..=TEMPLATE_RADIUS {
                    for tx in -TEMPLATE_RADIUS..=TEMPLATE_RADIUS {
                        let d = px(x + tx, y + ty) - px(qx + tx, qy + ty);
                        distance += d * d;
                    }
                }
                let weight = (-(distance / template_size) / h2).exp();
                weighted += weight * px(qx, qy);
                total += weight;
            }
        }

        Luma([(weighted / total).round().clamp(0.0, 255.0) as u8])
    })
}
