use image::{GrayImage, Rgb, RgbImage};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Canny 双阈值
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Hough 累加器投票阈值
const HOUGH_THRESHOLD: u32 = 50;
/// 超过这个角度基本是误检的边缘，不做旋转
const MAX_SKEW_DEGREES: f64 = 30.0;

/// 倾斜校正结果
#[derive(Debug, Clone)]
pub struct Deskewed {
    pub image: RgbImage,
    /// 实际旋转的角度（度），None 表示未旋转
    pub angle: Option<f64>,
}

/// 检测车牌倾斜并旋转校正
pub fn deskew_plate(crop: &RgbImage) -> Deskewed {
    let gray = image::imageops::grayscale(crop);
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let angles: Vec<f64> = hough_lines(&edges, gray.width(), gray.height(), HOUGH_THRESHOLD)
        .into_iter()
        .map(|(_, theta)| theta.to_degrees() - 90.0)
        .collect();
    correct_skew(crop, &angles)
}

/// 根据直线角度估计倾斜并旋转
pub fn correct_skew(crop: &RgbImage, angles: &[f64]) -> Deskewed {
    match skew_estimate(angles) {
        Some(angle) => Deskewed {
            image: rotate_about_center(crop, angle),
            angle: Some(angle),
        },
        None => Deskewed {
            image: crop.clone(),
            angle: None,
        },
    }
}

/// 倾斜角估计
///
/// 超过 4 条直线时去掉排序后首尾各四分之一再取中位数（尾部按向上取整截掉），
/// 否则直接取中位数。没有直线或者角度超过 30° 返回 None。
pub fn skew_estimate(angles: &[f64]) -> Option<f64> {
    if angles.is_empty() {
        return None;
    }

    let mut sorted = angles.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let trimmed = if n > 4 {
        &sorted[n / 4..n - (n + 3) / 4]
    } else {
        &sorted[..]
    };

    let angle = median(trimmed);
    if angle.abs() > MAX_SKEW_DEGREES {
        None
    } else {
        Some(angle)
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// 绕图像中心旋转（正角度为逆时针），越界部分填充白色，双线性插值
pub fn rotate_about_center(image: &RgbImage, angle_degrees: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    let cx = (width / 2) as f64;
    let cy = (height / 2) as f64;
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let white = [255.0_f64; 3];

    let sample = |x: i64, y: i64| -> [f64; 3] {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            return white;
        }
        let p = image.get_pixel(x as u32, y as u32);
        [p[0] as f64, p[1] as f64, p[2] as f64]
    };

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = cx + cos * dx - sin * dy;
        let sy = cy + sin * dx + cos * dy;

        let x0 = sx.floor();
        let y0 = sy.floor();
        let fx = sx - x0;
        let fy = sy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let p00 = sample(x0, y0);
        let p10 = sample(x0 + 1, y0);
        let p01 = sample(x0, y0 + 1);
        let p11 = sample(x0 + 1, y0 + 1);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let top = p00[c] * (1.0 - fx) + p10[c] * fx;
            let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Canny 边缘检测（3x3 Sobel，L1 梯度幅值），返回按行展开的边缘图
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> Vec<bool> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut edges = vec![false; w * h];
    if w < 3 || h < 3 {
        return edges;
    }

    let px = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32)[0] as f32;

    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];
    let mut magnitude = vec![0.0f32; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let sx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let sy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            let i = y * w + x;
            gx[i] = sx;
            gy[i] = sy;
            magnitude[i] = sx.abs() + sy.abs();
        }
    }

    // 非极大值抑制 + 强弱边缘分类
    let tan_22_5 = (22.5f32).to_radians().tan();
    let tan_67_5 = (67.5f32).to_radians().tan();
    let mut strong = VecDeque::new();
    let mut weak = vec![false; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs(), gy[i].abs());
            let (a, b) = if ay <= ax * tan_22_5 {
                (magnitude[i - 1], magnitude[i + 1])
            } else if ay > ax * tan_67_5 {
                (magnitude[i - w], magnitude[i + w])
            } else if gx[i] * gy[i] > 0.0 {
                (magnitude[i - w - 1], magnitude[i + w + 1])
            } else {
                (magnitude[i - w + 1], magnitude[i + w - 1])
            };
            if m > a && m >= b {
                if m > high {
                    edges[i] = true;
                    strong.push_back(i);
                } else {
                    weak[i] = true;
                }
            }
        }
    }

    // 滞后阈值：与强边缘 8 邻接的弱边缘保留
    while let Some(i) = strong.pop_front() {
        let (x, y) = (i % w, i / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let j = ny * w + nx;
                if weak[j] && !edges[j] {
                    edges[j] = true;
                    strong.push_back(j);
                }
            }
        }
    }

    edges
}

/// 标准 Hough 直线检测（rho 步长 1 像素，theta 步长 1°）
///
/// 返回 (rho, theta) 按票数降序排列，只保留票数超过阈值的局部极大值。
pub fn hough_lines(edges: &[bool], width: u32, height: u32, threshold: u32) -> Vec<(f64, f64)> {
    let (w, h) = (width as usize, height as usize);
    let num_angle = 180usize;
    let num_rho = (w + h) * 2 + 1;
    let rho_offset = (num_rho - 1) / 2;
    let theta_step = PI / num_angle as f64;

    let trig: Vec<(f64, f64)> = (0..num_angle)
        .map(|n| {
            let theta = n as f64 * theta_step;
            (theta.cos(), theta.sin())
        })
        .collect();

    // 四周各留一格，方便比较邻居
    let stride = num_rho + 2;
    let mut accumulator = vec![0u32; (num_angle + 2) * stride];
    for y in 0..h {
        for x in 0..w {
            if !edges[y * w + x] {
                continue;
            }
            for (n, (cos, sin)) in trig.iter().enumerate() {
                let r = (x as f64 * cos + y as f64 * sin).round() as i64 + rho_offset as i64;
                if r < 0 || r as usize >= num_rho {
                    continue;
                }
                accumulator[(n + 1) * stride + r as usize + 1] += 1;
            }
        }
    }

    let mut peaks: Vec<(u32, usize, usize)> = Vec::new();
    for n in 0..num_angle {
        for r in 0..num_rho {
            let base = (n + 1) * stride + r + 1;
            let votes = accumulator[base];
            if votes > threshold
                && votes > accumulator[base - 1]
                && votes >= accumulator[base + 1]
                && votes > accumulator[base - stride]
                && votes >= accumulator[base + stride]
            {
                peaks.push((votes, n, r));
            }
        }
    }
    peaks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    peaks
        .into_iter()
        .map(|(_, n, r)| (r as f64 - rho_offset as f64, n as f64 * theta_step))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_crop() -> RgbImage {
        RgbImage::from_fn(60, 20, |x, y| Rgb([(x * 4) as u8, (y * 10) as u8, 90]))
    }

    #[test]
    fn estimate_beyond_thirty_degrees_is_ignored() {
        let crop = gradient_crop();
        let result = correct_skew(&crop, &[35.0, 35.0, 35.0, 35.0, 35.0]);
        assert_eq!(result.angle, None);
        assert_eq!(result.image, crop);
    }

    #[test]
    fn moderate_tilt_rotates_by_median_angle() {
        let crop = gradient_crop();
        let result = correct_skew(&crop, &[9.0, 10.0, 10.0, 11.0, 10.0]);
        assert_eq!(result.angle, Some(10.0));
        assert_ne!(result.image, crop);
        assert_eq!(result.image.dimensions(), crop.dimensions());
    }

    #[test]
    fn no_lines_means_no_rotation() {
        let crop = gradient_crop();
        let result = correct_skew(&crop, &[]);
        assert_eq!(result.angle, None);
        assert_eq!(result.image, crop);
    }

    #[test]
    fn outer_quartiles_are_dropped_above_four_lines() {
        // n=8: 保留下标 2..6
        let angles = [-80.0, -60.0, 1.0, 2.0, 3.0, 4.0, 60.0, 80.0];
        assert_eq!(skew_estimate(&angles), Some(2.5));
        // n=5: 保留下标 1..3
        assert_eq!(skew_estimate(&[-50.0, 4.0, 6.0, 7.0, 50.0]), Some(5.0));
        // n<=4: 直接取中位数
        assert_eq!(skew_estimate(&[1.0, 3.0, 5.0, 100.0]), Some(4.0));
    }

    #[test]
    fn zero_rotation_keeps_pixels() {
        let crop = gradient_crop();
        assert_eq!(rotate_about_center(&crop, 0.0), crop);
    }

    #[test]
    fn rotation_fills_uncovered_corners_with_white() {
        let crop = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        let rotated = rotate_about_center(&crop, 45.0);
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rotated.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn detects_tilt_of_a_slanted_band() {
        let slope = 10f64.to_radians().tan();
        let crop = RgbImage::from_fn(200, 100, |x, y| {
            let center = 40.0 + x as f64 * slope;
            if (y as f64 - center).abs() < 8.0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let result = deskew_plate(&crop);
        let angle = result.angle.expect("slanted band should produce lines");
        assert!((angle - 10.0).abs() < 2.0, "estimated {}", angle);
    }
}
