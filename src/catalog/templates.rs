//! Bundled showcase content, used when the backend is empty or unreachable.

use super::{Product, ServiceItem, Testimonial};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn services() -> Vec<ServiceItem> {
    vec![
        ServiceItem {
            id: 1,
            title: "Solusi Printer & Refill".to_string(),
            description: "Servis, refill tinta dan toner, serta sewa printer untuk kantor dan usaha.".to_string(),
            icon: "printer".to_string(),
            features: strings(&["Refill tinta & toner", "Servis semua merek", "Sewa printer bulanan"]),
        },
        ServiceItem {
            id: 2,
            title: "Hardware & Komputer".to_string(),
            description: "Pengadaan, rakit, dan upgrade PC, laptop, serta perangkat pendukung.".to_string(),
            icon: "monitor".to_string(),
            features: strings(&["Rakit PC custom", "Upgrade SSD & RAM", "Garansi resmi"]),
        },
        ServiceItem {
            id: 3,
            title: "Instalasi CCTV".to_string(),
            description: "Pemasangan kamera pengawas dengan akses pantau jarak jauh.".to_string(),
            icon: "camera".to_string(),
            features: strings(&["Survey lokasi gratis", "Akses via smartphone", "Perawatan berkala"]),
        },
        ServiceItem {
            id: 4,
            title: "Infrastruktur Jaringan".to_string(),
            description: "Desain dan instalasi LAN, WiFi kantor, dan manajemen bandwidth.".to_string(),
            icon: "network".to_string(),
            features: strings(&["Kabel terstruktur", "WiFi mesh", "Konfigurasi router & firewall"]),
        },
        ServiceItem {
            id: 5,
            title: "Maintenance & Support".to_string(),
            description: "Kontrak perawatan IT rutin dengan dukungan teknisi on-site dan remote.".to_string(),
            icon: "wrench".to_string(),
            features: strings(&["Kunjungan terjadwal", "Remote support", "Laporan bulanan"]),
        },
    ]
}

pub fn products() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            name: "Epson EcoTank L3210".to_string(),
            category: "Printer".to_string(),
            description: "Printer multifungsi tangki tinta, hemat untuk cetak volume tinggi.".to_string(),
            image: "/images/products/epson-l3210.jpg".to_string(),
            price: Some("Rp 2.350.000".to_string()),
        },
        Product {
            id: 2,
            name: "PC Kantor Core i5".to_string(),
            category: "Komputer".to_string(),
            description: "Paket PC siap pakai untuk administrasi dan desain ringan.".to_string(),
            image: "/images/products/pc-office-i5.jpg".to_string(),
            price: Some("Rp 7.500.000".to_string()),
        },
        Product {
            id: 3,
            name: "Paket CCTV 4 Kamera".to_string(),
            category: "CCTV".to_string(),
            description: "DVR 4 channel, 4 kamera 2MP, HDD 1TB, termasuk instalasi.".to_string(),
            image: "/images/products/cctv-4ch.jpg".to_string(),
            price: Some("Rp 4.200.000".to_string()),
        },
        Product {
            id: 4,
            name: "Router & Access Point Kantor".to_string(),
            category: "Jaringan".to_string(),
            description: "Router gigabit dengan dua access point untuk cakupan satu lantai.".to_string(),
            image: "/images/products/network-kit.jpg".to_string(),
            price: None,
        },
    ]
}

pub fn testimonials() -> Vec<Testimonial> {
    vec![
        Testimonial {
            id: 1,
            name: "Andi Pratama".to_string(),
            role: "Office Manager".to_string(),
            company: "PT Sinar Jaya".to_string(),
            content: "Teknisi datang tepat waktu dan printer kantor langsung normal kembali.".to_string(),
            rating: 5,
        },
        Testimonial {
            id: 2,
            name: "Siti Rahma".to_string(),
            role: "Pemilik".to_string(),
            company: "Toko Berkah".to_string(),
            content: "CCTV terpasang rapi, bisa dipantau dari HP kapan saja.".to_string(),
            rating: 5,
        },
        Testimonial {
            id: 3,
            name: "Hendra Wijaya".to_string(),
            role: "IT Lead".to_string(),
            company: "CV Maju Bersama".to_string(),
            content: "Jaringan kantor jauh lebih stabil setelah ditata ulang oleh tim Mitrafix.".to_string(),
            rating: 4,
        },
    ]
}
