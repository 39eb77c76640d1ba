//! Reading one page of a scan session as a byte stream

use crate::bmp;
use crate::session::{ScanParameters, ScanSession};
use crate::value::ImageFormat;
use crate::{Error, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use std::io::{self, Read};

/// A single page received from the scanner.
///
/// Implements [`Read`]: bytes come out of an internal buffer that is
/// refilled with [`ScanSession::scan_read`] whenever it runs dry, and the
/// stream ends once the session reports the end of the page.
pub struct PageReader<'s, 'item> {
    session: &'s mut ScanSession<'item>,
    params: ScanParameters,
    buffer: Vec<u8>,
    pos: usize,
    filled: usize,
    started: bool,
}

impl<'s, 'item> PageReader<'s, 'item> {
    pub fn new(session: &'s mut ScanSession<'item>, params: ScanParameters) -> Self {
        let size = session.buffer_size();
        PageReader {
            session,
            params,
            buffer: vec![0; size],
            pos: 0,
            filled: 0,
            started: false,
        }
    }

    pub fn params(&self) -> &ScanParameters {
        &self.params
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    pub fn format(&self) -> ImageFormat {
        self.params.format
    }

    /// Read the rest of the page and decode it.
    pub fn image(&mut self) -> Result<DynamicImage> {
        match self.params.format {
            ImageFormat::Bmp => bmp::decode(self),
            ImageFormat::Grayscale8 => {
                let (data, height) = self.read_raw(1)?;
                GrayImage::from_raw(self.params.width, height, data)
                    .map(DynamicImage::ImageLuma8)
                    .ok_or_else(|| Error::Bmp("grayscale page size mismatch".to_string()))
            }
            ImageFormat::RawRgb24 => {
                let (data, height) = self.read_raw(3)?;
                RgbImage::from_raw(self.params.width, height, data)
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(|| Error::Bmp("RGB page size mismatch".to_string()))
            }
            other => Err(Error::UnsupportedFormat(other.name().to_string())),
        }
    }

    // The height announced before scanning is not reliable; derive it from
    // what was actually received, dropping an incomplete last row.
    fn read_raw(&mut self, bytes_per_pixel: usize) -> Result<(Vec<u8>, u32)> {
        let mut data = Vec::with_capacity(self.params.image_size.min(bmp::MAX_PREALLOC));
        self.read_to_end(&mut data)?;
        let row = self.params.width as usize * bytes_per_pixel;
        if row == 0 {
            return Err(Error::UnsupportedFormat("page of zero width".to_string()));
        }
        let rows = data.len() / row;
        data.truncate(rows * row);
        let height = u32::try_from(rows)
            .map_err(|_| Error::UnsupportedFormat("page too tall".to_string()))?;
        Ok((data, height))
    }
}

impl std::fmt::Debug for PageReader<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReader")
            .field("params", &self.params)
            .field("buffered", &(self.filled - self.pos))
            .finish_non_exhaustive()
    }
}

impl Read for PageReader<'_, '_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.pos == self.filled {
            // The first read of a page always reaches the device: the
            // previous page may still be flagged as complete.
            if self.started && self.session.end_of_page() {
                return Ok(0);
            }
            self.started = true;
            self.filled = self
                .session
                .scan_read(&mut self.buffer)
                .map_err(io::Error::other)?;
            self.pos = 0;
        }

        let n = out.len().min(self.filled - self.pos);
        out[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockItem, MockScanner};
    use crate::{Api, ApiConfig};

    fn api_with_pages(pages: Vec<Vec<u8>>, format: ImageFormat, width: u32) -> Api {
        let mut source = MockItem::flatbed("Flatbed").chunk_size(3).params(ScanParameters {
            format,
            width,
            height: 0,
            image_size: 0,
        });
        for page in pages {
            source = source.page(page);
        }
        let scanner = MockScanner::new().device(MockDevice::new("mock:0").source(source));
        Api::with_driver(scanner, ApiConfig::new().read_buffer_size(4)).unwrap()
    }

    #[test]
    fn test_reader_streams_page_then_eof() {
        let api = api_with_pages(vec![(0u8..10).collect()], ImageFormat::Grayscale8, 5);
        let device = api.get_device("mock:0").unwrap();
        let source = device.source("Flatbed").unwrap().unwrap();
        let mut session = source.scan_start().unwrap();

        let mut reader = session.page_reader().unwrap();
        let mut got = Vec::new();
        reader.read_to_end(&mut got).unwrap();
        assert_eq!(got, (0u8..10).collect::<Vec<_>>());
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_empty_destination_reads_nothing() {
        let api = api_with_pages(vec![vec![1, 2, 3]], ImageFormat::Grayscale8, 3);
        let device = api.get_device("mock:0").unwrap();
        let source = device.source("Flatbed").unwrap().unwrap();
        let mut session = source.scan_start().unwrap();
        let mut reader = session.page_reader().unwrap();
        assert_eq!(reader.read(&mut []).unwrap(), 0);
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
    }

    #[test]
    fn test_pages_are_read_one_after_the_other() {
        let api = api_with_pages(
            vec![vec![1; 6], vec![2; 6], vec![3; 6]],
            ImageFormat::Grayscale8,
            3,
        );
        let device = api.get_device("mock:0").unwrap();
        let source = device.source("Flatbed").unwrap().unwrap();
        let mut session = source.scan_start().unwrap();

        let mut pages = Vec::new();
        while !session.end_of_feed() {
            let img = session.page_reader().unwrap().image().unwrap();
            assert_eq!((img.width(), img.height()), (3, 2));
            pages.push(img.to_luma8().as_raw()[0]);
        }
        assert_eq!(pages, [1, 2, 3]);
    }

    #[test]
    fn test_raw_rgb_drops_incomplete_row() {
        let api = api_with_pages(vec![vec![9; 2 * 3 * 2 + 1]], ImageFormat::RawRgb24, 2);
        let device = api.get_device("mock:0").unwrap();
        let source = device.source("Flatbed").unwrap().unwrap();
        let mut session = source.scan_start().unwrap();
        let img = session.page_reader().unwrap().image().unwrap();
        assert_eq!((img.width(), img.height()), (2, 2));
    }

    #[test]
    fn test_announced_image_size_is_not_trusted() {
        let source = MockItem::flatbed("Flatbed").page(vec![5; 6]).params(ScanParameters {
            format: ImageFormat::Grayscale8,
            width: 3,
            height: 2,
            image_size: usize::MAX,
        });
        let scanner = MockScanner::new().device(MockDevice::new("mock:0").source(source));
        let api = Api::with_driver(scanner, ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        let source = device.source("Flatbed").unwrap().unwrap();
        let mut session = source.scan_start().unwrap();
        let img = session.page_reader().unwrap().image().unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn test_unsupported_format_is_reported() {
        let api = api_with_pages(vec![vec![0; 4]], ImageFormat::Tiff, 2);
        let device = api.get_device("mock:0").unwrap();
        let source = device.source("Flatbed").unwrap().unwrap();
        let mut session = source.scan_start().unwrap();
        let err = session.page_reader().unwrap().image().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
