//! 双阈值 Canny 边缘检测（3x3 Sobel，L1 梯度）

use image::{GrayImage, Luma};

const TAN_22_5: f32 = 0.414_213_57;

/// 返回二值边缘图，边缘像素为 255
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let mut edges = GrayImage::new(w, h);
    if wu == 0 || hu == 0 {
        return edges;
    }

    let (gx, gy, mag) = sobel(gray);

    // 0 = 非候选, 1 = 弱边缘, 2 = 强边缘
    let mut class = vec![0u8; wu * hu];
    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= wu as isize || y >= hu as isize {
            0
        } else {
            mag[y as usize * wu + x as usize]
        }
    };

    for y in 0..hu {
        for x in 0..wu {
            let idx = y * wu + x;
            let m = mag[idx];
            if (m as f32) <= low {
                continue;
            }

            let (xi, yi) = (x as isize, y as isize);
            let ax = gx[idx].abs() as f32;
            let ay = gy[idx].abs() as f32;
            let tg22 = ax * TAN_22_5;
            let tg67 = tg22 + ax * 2.0;

            let is_max = if ay < tg22 {
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else if ay > tg67 {
                m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
            } else {
                let s: isize = if (gx[idx] ^ gy[idx]) < 0 { -1 } else { 1 };
                m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
            };

            if is_max {
                class[idx] = if m as f32 > high { 2 } else { 1 };
            }
        }
    }

    // 滞后阈值：从强边缘出发沿 8 邻域吸收弱边缘
    let mut stack: Vec<usize> = (0..class.len()).filter(|&i| class[i] == 2).collect();
    while let Some(idx) = stack.pop() {
        let (x, y) = ((idx % wu) as isize, (idx / wu) as isize);
        edges.put_pixel(x as u32, y as u32, Luma([255]));

        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= wu as isize || ny >= hu as isize {
                    continue;
                }
                let n = ny as usize * wu + nx as usize;
                if class[n] == 1 {
                    class[n] = 2;
                    stack.push(n);
                }
            }
        }
    }

    edges
}

/// 边缘像素占比
pub fn edge_density(gray: &GrayImage, low: f32, high: f32) -> f32 {
    let total = gray.width() as usize * gray.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let count = canny(gray, low, high).pixels().filter(|p| p[0] > 0).count();
    count as f32 / total as f32
}

/// 边界复制的 3x3 Sobel
fn sobel(gray: &GrayImage) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let raw = gray.as_raw();
    let px = |x: isize, y: isize| -> i32 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        raw[cy * w + cx] as i32
    };

    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];
    let mut mag = vec![0i32; w * h];

    for y in 0..h as isize {
        for x in 0..w as isize {
            let dx = (px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2 * px(x - 1, y) + px(x - 1, y + 1));
            let dy = (px(x - 1, y + 1) + 2 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2 * px(x, y - 1) + px(x + 1, y - 1));
            let idx = y as usize * w + x as usize;
            gx[idx] = dx;
            gy[idx] = dy;
            mag[idx] = dx.abs() + dy.abs();
        }
    }

    (gx, gy, mag)
}
